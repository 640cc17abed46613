//! Move advisor scenarios.

use cellbridge::{
    Advice, AdvisorConfig, Faction, Move, MoveAdvisor, Scene, SceneSnapshot, SimConfig, TurnRecord,
};

fn advisor() -> MoveAdvisor {
    MoveAdvisor::new(AdvisorConfig::default().with_time_budget_ms(10_000))
}

#[test]
fn test_single_legal_move_is_returned_verbatim() {
    let mut scene = Scene::new(SimConfig::default());
    let a = scene.add_cell(0.0, 0.0, Faction::Player, 5);
    let b = scene.add_cell(40.0, 0.0, Faction::Enemy, 5);

    assert_eq!(scene.legal_moves(Faction::Player).len(), 1);
    assert_eq!(
        advisor().recommend(&scene, Faction::Player),
        Advice::Move(Move {
            source: a,
            target: b,
            cost: 1
        })
    );
}

#[test]
fn test_no_legal_move_reported() {
    let mut scene = Scene::new(SimConfig::default());
    scene.add_cell(0.0, 0.0, Faction::Player, 0);
    scene.add_cell(400.0, 0.0, Faction::Enemy, 10);

    assert_eq!(advisor().recommend(&scene, Faction::Player), Advice::NoMove);
}

#[test]
fn test_advice_is_read_only() {
    let mut scene = Scene::new(SimConfig::default());
    scene.add_cell(0.0, 0.0, Faction::Player, 25);
    scene.add_cell(80.0, 0.0, Faction::Enemy, 25);
    scene.add_cell(0.0, 80.0, Faction::Enemy, 8);

    let turn = TurnRecord {
        active: Some(Faction::Player),
        remaining_seconds: 30,
    };
    let before = SceneSnapshot::capture(&scene, turn);
    advisor().recommend(&scene, Faction::Player);
    let after = SceneSnapshot::capture(&scene, turn);

    assert_eq!(before, after, "the advisor must never mutate live state");
}

#[test]
fn test_recommendation_is_legal_in_the_live_scene() {
    let mut scene = Scene::new(SimConfig::default());
    scene.add_cell(0.0, 0.0, Faction::Player, 25);
    scene.add_cell(80.0, 0.0, Faction::Player, 11);
    scene.add_cell(40.0, 40.0, Faction::Enemy, 25);
    scene.add_cell(120.0, 40.0, Faction::Enemy, 9);

    let advice = advisor().recommend(&scene, Faction::Enemy);
    let mv = advice.as_move().expect("moves exist for the enemy");
    assert!(scene.legal_moves(Faction::Enemy).contains(&mv));
}

#[test]
fn test_seeded_advice_is_reproducible() {
    let mut scene = Scene::new(SimConfig::default());
    scene.add_cell(0.0, 0.0, Faction::Player, 25);
    scene.add_cell(80.0, 0.0, Faction::Enemy, 25);
    scene.add_cell(0.0, 80.0, Faction::Enemy, 14);
    scene.add_cell(80.0, 80.0, Faction::Player, 9);

    let config = AdvisorConfig::default()
        .with_seed(99)
        .with_time_budget_ms(10_000);
    let first = MoveAdvisor::new(config.clone()).recommend(&scene, Faction::Player);
    let second = MoveAdvisor::new(config).recommend(&scene, Faction::Player);
    assert_eq!(first, second);
}

#[test]
fn test_prefers_finishing_blow() {
    let mut scene = Scene::new(SimConfig::default());
    scene.add_cell(0.0, 0.0, Faction::Player, 30);
    let last_enemy = scene.add_cell(40.0, 0.0, Faction::Enemy, 1);
    scene.add_cell(80.0, 0.0, Faction::Player, 12);

    let advice = advisor().recommend(&scene, Faction::Player);
    assert_eq!(advice.as_move().unwrap().target, last_enemy);
}
