use approx::assert_relative_eq;
use glam::Vec2;

use super::*;
use crate::body::KinematicBody;
use crate::combo::{AttackPhase, ComboRuntimeState};
use crate::config::{CombatTables, DT};

fn loadout() -> Loadout {
    CombatTables::builtin().unwrap().loadout()
}

fn fighter() -> Fighter<KinematicBody> {
    Fighter::spawn(1, &loadout(), KinematicBody::default()).unwrap()
}

fn press(f: impl FnOnce(&mut FighterInput)) -> FighterInput {
    let mut input = FighterInput::default();
    f(&mut input);
    input
}

/// Sets the input, runs one tick and integrates the body.
fn step(fighter: &mut Fighter<KinematicBody>, now: Tick, input: FighterInput) {
    fighter.set_input(input);
    fighter.fixed_tick(now).unwrap();
    fighter.body_mut().step(DT);
}

#[test]
fn spawns_idle_with_full_resources() {
    let fighter = fighter();
    assert!(fighter.is_in::<Idle>());
    assert_eq!(fighter.state_name(), Some("idle"));
    assert_eq!(fighter.health(), 100);
    assert_eq!(fighter.combo().energy(), 50);
    assert_eq!(fighter.context().movement.dash_charges, 2);
}

#[test]
fn walks_and_stops() {
    let mut fighter = fighter();
    let left = press(|i| i.axis = Vec2::new(-1.0, 0.0));
    step(&mut fighter, 0, left);
    assert!(fighter.is_in::<Move>());
    step(&mut fighter, 1, left);
    assert_relative_eq!(fighter.body().velocity.x, -6.0);
    assert_eq!(fighter.body().facing, Facing::Left);

    step(&mut fighter, 2, FighterInput::default());
    assert!(fighter.is_in::<Idle>());
    assert_eq!(fighter.body().velocity.x, 0.0);
}

/// One of two jumps spent and airborne: a jump press re-enters Jump and
/// spends the second charge; a third press is ignored until landing.
#[test]
fn double_jump_reenters_jump() {
    let mut fighter = fighter();
    let jump = press(|i| i.jump = true);

    step(&mut fighter, 0, jump);
    assert!(fighter.is_in::<Jump>());
    assert_eq!(fighter.context().movement.jumps_used, 1);
    assert!(!fighter.body().grounded);
    let first = fighter.machine.replicated().unwrap();

    step(&mut fighter, 1, jump);
    assert!(fighter.is_in::<Jump>());
    assert_eq!(fighter.context().movement.jumps_used, 2);
    let second = fighter.machine.replicated().unwrap();
    assert_eq!(second.id, first.id);
    assert_ne!(second.entry_seq, first.entry_seq);

    step(&mut fighter, 2, jump);
    assert_eq!(fighter.context().movement.jumps_used, 2);
    assert_eq!(fighter.machine.replicated(), Some(second));

    let mut now = 3;
    while !fighter.is_in::<Idle>() {
        step(&mut fighter, now, FighterInput::default());
        now += 1;
        assert!(now < 300, "never landed");
    }
    assert!(fighter.body().grounded);
    assert_eq!(fighter.context().movement.jumps_used, 0);
    assert_relative_eq!(fighter.body().gravity_scale, 1.0);
}

#[test]
fn walking_off_a_ledge_falls_without_spending_a_jump() {
    let mut fighter = fighter();
    fighter.body_mut().position.y = 3.0;
    fighter.body_mut().grounded = false;
    step(&mut fighter, 0, FighterInput::default());
    assert!(fighter.is_in::<Jump>());
    assert_eq!(fighter.context().movement.jumps_used, 0);
    assert!(fighter.body().velocity.y <= 0.0);
}

#[test]
fn dash_spends_charges_then_cools_down() {
    let mut fighter = fighter();
    let dash = press(|i| i.dash = true);

    step(&mut fighter, 0, dash);
    assert!(fighter.is_in::<Dash>());
    assert_eq!(fighter.context().movement.dash_charges, 1);
    assert!(fighter.context().hit.dash_invincible);
    assert!(!fighter.body().player_collisions);
    assert_relative_eq!(fighter.body().velocity.x, 18.0);

    let mut now = 1;
    while fighter.is_in::<Dash>() {
        step(&mut fighter, now, FighterInput::default());
        now += 1;
    }
    assert_eq!(now, 11);
    assert!(fighter.is_in::<Idle>());
    assert!(!fighter.context().hit.dash_invincible);
    assert!(fighter.body().player_collisions);

    let cooldown_start = now;
    step(&mut fighter, now, dash);
    assert_eq!(fighter.context().movement.dash_charges, 0);
    assert!(fighter.context().movement.dash_cooling);
    now += 1;
    while fighter.is_in::<Dash>() {
        step(&mut fighter, now, FighterInput::default());
        now += 1;
    }

    step(&mut fighter, now, dash);
    assert!(fighter.is_in::<Idle>(), "dashed without a charge");

    let refilled = cooldown_start + fighter.context().config.dash_cooldown_ticks;
    step(&mut fighter, refilled, dash);
    assert!(fighter.is_in::<Dash>());
    assert_eq!(fighter.context().movement.dash_charges, 1);
}

#[test]
fn attack_hitbox_opens_once_per_instance() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.attack = true));
    assert!(fighter.is_in::<Attack>());
    assert_eq!(fighter.combo().combo_index(), 1);
    let events = fighter.take_events();
    assert!(matches!(
        events.as_slice(),
        [FighterEvent::AttackStarted(started)] if started.name == "jab" && started.start_tick == 0
    ));

    // jab: startup 5, active 3.
    for now in 1..5 {
        step(&mut fighter, now, FighterInput::default());
        assert!(fighter.active_hitbox().is_none());
    }
    step(&mut fighter, 5, FighterInput::default());
    assert_eq!(fighter.combo().phase(), AttackPhase::Active);
    let hitbox = fighter.active_hitbox().unwrap();
    assert_relative_eq!(hitbox.center.x, 0.9);

    fighter.mark_attack_landed();
    assert!(fighter.active_hitbox().is_none());
    step(&mut fighter, 6, FighterInput::default());
    assert!(fighter.active_hitbox().is_none());
}

#[test]
fn combo_window_press_chains_the_next_attack() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.attack = true));
    fighter.mark_attack_landed();

    let mut now = 1;
    while fighter.combo().phase() != AttackPhase::ComboWindow {
        step(&mut fighter, now, FighterInput::default());
        now += 1;
    }
    step(&mut fighter, now, press(|i| i.attack = true));
    assert!(fighter.is_in::<Attack>());
    assert_eq!(fighter.combo().combo_index(), 2);
    assert_eq!(fighter.combo().state().attack_start, now);
    assert!(!fighter.context().attack_landed);
    assert_eq!(fighter.combo().energy(), 45);
}

#[test]
fn attack_returns_to_idle_when_the_window_closes() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.attack = true));
    let mut now = 1;
    while fighter.is_in::<Attack>() {
        step(&mut fighter, now, FighterInput::default());
        now += 1;
        assert!(now < 100);
    }
    assert!(fighter.is_in::<Idle>());
    assert_eq!(*fighter.combo().state(), ComboRuntimeState {
        energy: 50,
        ..Default::default()
    });
}

#[test]
fn hit_applies_knockback_and_recovers() {
    let mut fighter = fighter();
    let payload = HitPayload {
        attacker: 2,
        damage: 10,
        knockback: Vec2::new(5.0, 0.0),
        hitstun: 12,
    };
    assert!(fighter.take_hit(payload, 100).unwrap());
    assert!(fighter.is_in::<Hit>());
    assert_eq!(fighter.health(), 90);
    assert!(!fighter.context().input_enabled);
    assert_relative_eq!(fighter.body().velocity.x, 5.0);

    // Post-hit invincibility refuses the follow-up.
    assert!(!fighter.take_hit(payload, 101).unwrap());
    assert_eq!(fighter.health(), 90);

    let mut previous = 5.0;
    for now in 101..112 {
        step(&mut fighter, now, FighterInput::default());
        assert!(fighter.is_in::<Hit>());
        let speed = fighter.context().hit.knockback.length();
        assert!(speed <= previous);
        previous = speed;
    }
    step(&mut fighter, 112, FighterInput::default());
    assert!(fighter.is_in::<Idle>());
    assert!(fighter.context().input_enabled);
    assert_eq!(fighter.context().hit.knockback, Vec2::ZERO);

    // Invincible for hitstun + 20 ticks from the hit.
    step(&mut fighter, 131, FighterInput::default());
    assert!(fighter.context().hit.is_invincible());
    step(&mut fighter, 132, FighterInput::default());
    assert!(!fighter.context().hit.is_invincible());
}

#[test]
fn hit_cancels_the_combo() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.attack = true));
    assert!(fighter.combo().is_executing());
    let payload = HitPayload {
        attacker: 2,
        damage: 5,
        knockback: Vec2::new(-2.0, 1.0),
        hitstun: 8,
    };
    fighter.take_hit(payload, 3).unwrap();
    assert!(fighter.is_in::<Hit>());
    assert_eq!(fighter.combo().combo_index(), 0);
    assert_eq!(fighter.combo().phase(), AttackPhase::None);
}

#[test]
fn dashing_fighters_cannot_be_hit() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.dash = true));
    let payload = HitPayload {
        attacker: 2,
        damage: 5,
        knockback: Vec2::ZERO,
        hitstun: 8,
    };
    assert!(!fighter.take_hit(payload, 1).unwrap());
    assert!(fighter.is_in::<Dash>());
}

/// Health dropping to zero mid-combo sends the fighter to Die on the next
/// tick; a round reset brings back default runtime state.
#[test]
fn death_preempts_and_round_reset_restores() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.attack = true));
    fighter.take_events();
    for now in 1..=5 {
        step(&mut fighter, now, FighterInput::default());
    }
    assert_eq!(fighter.combo().phase(), AttackPhase::Active);

    fighter.context_mut().health = 0;
    step(&mut fighter, 6, FighterInput::default());
    assert!(fighter.is_in::<Die>());
    assert_eq!(fighter.combo().combo_index(), 0);
    assert!(fighter.body().frozen);
    assert_eq!(fighter.take_events(), vec![FighterEvent::Died]);

    step(&mut fighter, 7, press(|i| i.attack = true));
    assert!(fighter.is_in::<Die>());
    assert!(fighter.take_events().is_empty());

    fighter.reset_round().unwrap();
    assert!(fighter.is_in::<Die>());
    step(&mut fighter, 8, FighterInput::default());
    assert!(fighter.is_in::<Idle>());

    let ctx = fighter.context();
    assert_eq!(ctx.health, 100);
    assert_eq!(*ctx.combo.state(), ComboRuntimeState {
        energy: 50,
        ..Default::default()
    });
    assert_eq!(ctx.hit, HitRuntimeState::default());
    assert!(ctx.input_enabled);
    assert!(!ctx.round_reset);
    assert!(!fighter.body().frozen);
}

#[test]
fn lethal_hit_goes_straight_to_die() {
    let mut fighter = fighter();
    let payload = HitPayload {
        attacker: 2,
        damage: 500,
        knockback: Vec2::new(5.0, 0.0),
        hitstun: 12,
    };
    assert!(fighter.take_hit(payload, 10).unwrap());
    assert!(fighter.is_in::<Die>());
    assert_eq!(fighter.health(), 0);
    assert!(fighter.context().incoming.is_none());
    // Dead fighters take no further hits.
    assert!(!fighter.take_hit(payload, 11).unwrap());
}

#[test]
fn reset_round_from_a_live_state_goes_idle() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.dash = true));
    fighter.reset_round().unwrap();
    assert!(fighter.is_in::<Idle>());
    assert_eq!(fighter.context().movement.dash_charges, 2);
    assert!(!fighter.context().hit.dash_invincible);
}

#[test]
fn force_idle_drops_the_attack() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.attack = true));
    assert!(fighter.force_idle().unwrap());
    assert!(fighter.is_in::<Idle>());
    assert_eq!(fighter.combo().combo_index(), 0);
    assert!(!fighter.force_idle().unwrap());
}

#[test]
fn replicas_refuse_authority_operations() {
    let mut replica = Fighter::replica(1, &loadout(), KinematicBody::default()).unwrap();
    let payload = HitPayload {
        attacker: 2,
        damage: 5,
        knockback: Vec2::ZERO,
        hitstun: 8,
    };
    assert!(matches!(
        replica.take_hit(payload, 0),
        Err(FsmError::NotAuthority(_))
    ));
    assert!(matches!(
        replica.fixed_tick(0),
        Err(FsmError::NotAuthority(_))
    ));
    assert!(replica.reset_round().is_err());
    assert_eq!(replica.state(), None);
}

/// Touching the floor restores jump charges before transitions run, so a
/// press on the landing tick still leaves the double jump available.
#[test]
fn jump_on_the_landing_tick_keeps_the_double_jump() {
    let mut fighter = fighter();
    let jump = press(|i| i.jump = true);
    step(&mut fighter, 0, jump);

    let mut now = 1;
    while !fighter.body().grounded {
        step(&mut fighter, now, FighterInput::default());
        now += 1;
        assert!(now < 300, "never landed");
    }
    assert!(fighter.is_in::<Jump>());

    step(&mut fighter, now, jump);
    assert!(fighter.is_in::<Jump>());
    assert_eq!(fighter.context().movement.jumps_used, 1);
    assert!(!fighter.body().grounded);
    let first = fighter.machine.replicated().unwrap();

    step(&mut fighter, now + 1, jump);
    assert_eq!(fighter.context().movement.jumps_used, 2);
    assert_ne!(fighter.machine.replicated(), Some(first));
}

/// A reset only takes a dead fighter out of Die on its next tick; until then
/// hits are refused so Die never hands over to Hit.
#[test]
fn reset_fighter_refuses_hits_until_it_leaves_die() {
    let mut fighter = fighter();
    let lethal = HitPayload {
        attacker: 2,
        damage: 500,
        knockback: Vec2::new(5.0, 0.0),
        hitstun: 12,
    };
    assert!(fighter.take_hit(lethal, 10).unwrap());
    fighter.reset_round().unwrap();

    let jab = HitPayload { damage: 5, ..lethal };
    assert!(!fighter.take_hit(jab, 11).unwrap());
    assert!(fighter.is_in::<Die>());
    assert_eq!(fighter.health(), 100);

    step(&mut fighter, 12, FighterInput::default());
    assert!(fighter.is_in::<Idle>());
    assert!(fighter.take_hit(jab, 13).unwrap());
    assert!(fighter.is_in::<Hit>());
    assert_eq!(fighter.health(), 95);
}

#[test]
fn attack_press_as_the_window_closes_starts_a_new_combo() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.attack = true));
    fighter.take_events();

    let mut now = 1;
    while fighter.combo().is_executing() {
        step(&mut fighter, now, FighterInput::default());
        now += 1;
        assert!(now < 100);
    }
    assert!(fighter.is_in::<Attack>());
    let before = fighter.machine.replicated().unwrap();

    step(&mut fighter, now, press(|i| i.attack = true));
    assert!(fighter.is_in::<Attack>());
    assert_eq!(fighter.combo().combo_index(), 1);
    assert_eq!(fighter.combo().state().attack_start, now);
    assert_ne!(fighter.machine.replicated(), Some(before));
    let events = fighter.take_events();
    assert!(matches!(
        events.as_slice(),
        [FighterEvent::AttackStarted(started)] if started.combo_index == 1 && started.start_tick == now
    ));
}

/// Presses are only read in the combo window; one during Recovery neither
/// chains nor cancels.
#[test]
fn attack_press_during_recovery_is_ignored() {
    let mut fighter = fighter();
    step(&mut fighter, 0, press(|i| i.attack = true));
    let mut now = 1;
    while fighter.combo().phase() != AttackPhase::Recovery {
        step(&mut fighter, now, FighterInput::default());
        now += 1;
    }
    let before = *fighter.combo().state();

    step(&mut fighter, now, press(|i| i.attack = true));
    assert!(fighter.is_in::<Attack>());
    assert_eq!(fighter.combo().phase(), AttackPhase::Recovery);
    assert_eq!(fighter.combo().combo_index(), before.combo_index);
    assert_eq!(fighter.combo().state().attack_start, before.attack_start);
}
