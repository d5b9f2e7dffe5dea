use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use petriflow::analysis::{
    BoundednessResult, CoverabilityTree, NodeMark, check_boundedness, place_invariants,
    reachable,
};
use petriflow::net::{
    Engine, FireError, IncidenceMatrix, Marking, Net, NetBuilder, Place, read_net,
};

fn data(name: &str) -> String {
    format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// p0 -> t0 -> p1 -> t1 -> {p2, p3} -> t2 -> p0
fn cyclic() -> Net {
    NetBuilder::new()
        .place(Place::new_with_tokens_and_capacity("p0", 1, 0))
        .place(Place::new("p1"))
        .place(Place::new("p2"))
        .place(Place::new("p3"))
        .transition("t0")
        .transition("t1")
        .transition("t2")
        .arc("p0", "t0")
        .arc("t0", "p1")
        .arc("p1", "t1")
        .arc("t1", "p2")
        .arc("t1", "p3")
        .arc("p2", "t2")
        .arc("p3", "t2")
        .arc("t2", "p0")
        .build()
        .unwrap()
}

/// Every marking reachable from the initial one, for bounded nets.
fn reachable_markings(net: &Net) -> Vec<Marking> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([net.initial_marking()]);
    let mut out = Vec::new();
    while let Some(marking) = queue.pop_front() {
        if !seen.insert(marking.as_slice().to_vec()) {
            continue;
        }
        for t in net.enabled_transitions(&marking) {
            if let Ok(next) = net.fire(&marking, t) {
                queue.push_back(next);
            }
        }
        out.push(marking);
    }
    out
}

#[test]
fn light_switch_round_trip() {
    let net = Arc::new(read_net(data("light_switch.json")).unwrap());
    let mut engine = Engine::new(net);
    assert_eq!(engine.tokens("off"), Some(1));
    assert_eq!(engine.tokens("shining"), Some(0));

    engine.fire_named("illuminate").unwrap();
    assert_eq!(engine.tokens("off"), Some(0));
    assert_eq!(engine.tokens("shining"), Some(1));
    assert!(!engine.enabled_named("illuminate").unwrap());

    engine.fire_named("extinguish").unwrap();
    assert_eq!(engine.tokens("off"), Some(1));
    assert_eq!(engine.tokens("shining"), Some(0));
}

#[test]
fn bounded_queue_fills_on_sixth_enqueue() {
    let net = NetBuilder::new()
        .place(Place::new_with_tokens_and_capacity("Q", 0, 5))
        .transition("enqueue")
        .transition("dequeue")
        .arc("enqueue", "Q")
        .arc("Q", "dequeue")
        .build()
        .unwrap();
    let mut engine = Engine::new(Arc::new(net));

    for _ in 0..5 {
        engine.fire_named("enqueue").unwrap();
    }
    let err = engine.fire_named("enqueue").unwrap_err();
    assert!(matches!(err, FireError::PlaceFull { capacity: 5, .. }));
    assert_eq!(engine.tokens("Q"), Some(5));
}

#[test]
fn cyclic_incidence_matches_hand_computed() {
    let matrix = IncidenceMatrix::from_net(&cyclic());
    let rows: Vec<Vec<i64>> = matrix.rows().map(|row| row.to_vec()).collect();
    assert_eq!(
        rows,
        vec![
            vec![-1, 1, 0, 0],
            vec![0, -1, 1, 1],
            vec![1, 0, -1, -1],
        ]
    );
}

#[test]
fn firing_laws_hold_on_every_reachable_marking() {
    let net = cyclic();
    let matrix = IncidenceMatrix::from_net(&net);
    let markings = reachable_markings(&net);
    assert_eq!(markings.len(), 3);

    for marking in &markings {
        for t in net.transitions().indices() {
            let inputs: Vec<_> = net.input_places(t).collect();
            let expected = inputs.iter().all(|p| marking.tokens(*p) >= 1);
            assert_eq!(net.is_enabled(marking, t), expected);
            if !expected {
                continue;
            }

            let next = net.fire(marking, t).unwrap();
            let outputs = net.output_places(t).count() as u64;
            assert_eq!(next.total(), marking.total() - inputs.len() as u64 + outputs);
            assert_eq!(
                matrix.apply(marking, &matrix.firing_vector(t)),
                Some(next.clone())
            );

            for invariant in place_invariants(&net) {
                let weigh = |m: &Marking| -> i64 {
                    invariant
                        .iter()
                        .zip(m.as_slice())
                        .map(|(w, tokens)| i64::try_from(w.clone()).unwrap() * *tokens as i64)
                        .sum()
                };
                assert_eq!(weigh(marking), weigh(&next));
            }
        }
    }
}

#[test]
fn domination_is_antisymmetric() {
    let markings = [
        Marking::from(vec![1, 0, 2]),
        Marking::from(vec![1, 1, 2]),
        Marking::from(vec![0, 3, 0]),
        Marking::from(vec![1, 0, 2]),
    ];
    for a in &markings {
        for b in &markings {
            if a != b && a.dominates(b) {
                assert!(!b.dominates(a));
            }
        }
        assert!(!a.dominates(a));
    }
    assert!(markings[1].dominates(&markings[0]));
}

#[test]
fn state_equation_on_cyclic_net() {
    let net = cyclic();
    let initial = net.initial_marking();
    assert!(reachable(&net, &initial, &Marking::from(vec![0, 0, 1, 1])).unwrap());
    assert!(!reachable(&net, &initial, &Marking::from(vec![2, 0, 0, 0])).unwrap());
    assert!(!reachable(&net, &initial, &Marking::from(vec![0, 0, 1, 0])).unwrap());
}

#[test]
fn coverability_of_loaded_nets() {
    let switch = read_net(data("light_switch.json")).unwrap();
    let tree = CoverabilityTree::build(&switch, &switch.initial_marking());
    assert!(tree.is_bounded());
    assert!(tree.nodes().iter().any(|n| n.mark == NodeMark::Duplicate));
    assert_eq!(check_boundedness(&switch, None), BoundednessResult::Bounded);

    let pipeline = read_net(data("pipeline.ron")).unwrap();
    match check_boundedness(&pipeline, Some(1_000)) {
        BoundednessResult::Unbounded { places, witness } => {
            let names: Vec<_> = places
                .iter()
                .map(|p| pipeline.places()[*p].name.as_str())
                .collect();
            assert!(names.contains(&"queue"));
            assert!(!names.contains(&"ready"));
            assert!(!witness.is_empty());
        }
        other => panic!("expected unbounded, got {other}"),
    }
}

#[test]
fn definition_survives_json_and_ron() {
    let json = read_net(data("light_switch.json")).unwrap();
    let ron = read_net(data("pipeline.ron")).unwrap();
    assert_eq!(json.definition().build().unwrap().definition(), json.definition());
    assert_eq!(ron.transitions_len(), 2);
    assert_eq!(ron.place_id("done").map(|p| ron.places()[p].capacity), Some(0));
}
