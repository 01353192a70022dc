use comfy_graph::{find_output_node, replace_key_value, ClassFilter, JobGraph};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// A node map where every node carries `seed`, with classes drawn from A/B/C.
fn seeded_graph() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::vec((prop_oneof!["A", "B", "C"], any::<i32>()), 1..12).prop_map(
        |nodes| {
            nodes
                .into_iter()
                .enumerate()
                .map(|(idx, (class_type, seed))| {
                    (
                        idx.to_string(),
                        json!({"class_type": class_type, "seed": seed, "inputs": {"steps": 20}}),
                    )
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn prop_replace_is_idempotent(graph in seeded_graph(), new_seed in any::<i64>()) {
        let filter = ClassFilter::except(["B"]);
        let mut once = graph.clone();
        replace_key_value(&mut once, "seed", &json!(new_seed), &filter);

        let mut twice = once.clone();
        replace_key_value(&mut twice, "seed", &json!(new_seed), &filter);

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_exclude_mode_spares_listed_class(graph in seeded_graph()) {
        let mut edited = graph.clone();
        replace_key_value(&mut edited, "seed", &json!(-1), &ClassFilter::except(["A"]));

        for (id, node) in &edited {
            if node["class_type"] == "A" {
                prop_assert_eq!(&node["seed"], &graph[id]["seed"]);
            } else {
                prop_assert_eq!(&node["seed"], &json!(-1));
            }
        }
    }

    #[test]
    fn prop_include_mode_touches_only_listed_class(graph in seeded_graph()) {
        let mut edited = graph.clone();
        replace_key_value(&mut edited, "seed", &json!(-1), &ClassFilter::only(["A"]));

        for (id, node) in &edited {
            if node["class_type"] == "A" {
                prop_assert_eq!(&node["seed"], &json!(-1));
            } else {
                prop_assert_eq!(&node["seed"], &graph[id]["seed"]);
            }
        }
    }

    #[test]
    fn prop_single_save_image_found_at_any_depth(depth in 0usize..6, filler in 0usize..4) {
        let mut inner = json!({"class_type": "SaveImage"});
        for level in 0..depth {
            inner = json!({ format!("wrap{level}"): inner, "count": level });
        }
        let mut graph = Map::new();
        for idx in 0..filler {
            graph.insert(format!("f{idx}"), json!({"class_type": "Foo", "list": [1, 2]}));
        }
        graph.insert("target".to_string(), inner);

        let expected = if depth == 0 { "target".to_string() } else { "wrap0".to_string() };
        prop_assert_eq!(find_output_node(&graph), Some(expected));
    }
}

#[test]
fn returns_none_without_save_image() {
    let graph = object(json!({
        "1": {"class_type": "PreviewImage"},
        "2": {"class_type": "Foo", "inputs": {"nested": {"class_type": "Bar"}}}
    }));
    assert_eq!(find_output_node(&graph), None);
}

#[test]
fn two_save_images_resolve_deterministically() {
    let graph = JobGraph::from_json_str(
        r#"{"7": {"class_type": "SaveImage"}, "2": {"class_type": "SaveImage"}}"#,
    )
    .unwrap();
    for _ in 0..10 {
        assert_eq!(graph.output_node().as_deref(), Some("7"));
    }
}

#[test]
fn replaces_key_behind_array_inside_nested_dicts() {
    let mut graph = object(json!({
        "outer": {
            "middle": {
                "items": [
                    {"seed": 1},
                    {"other": true},
                    {"seed": 3}
                ]
            }
        }
    }));

    replace_key_value(&mut graph, "seed", &json!(0), &ClassFilter::all());

    assert_eq!(
        Value::Object(graph),
        json!({
            "outer": {
                "middle": {
                    "items": [
                        {"seed": 0},
                        {"other": true},
                        {"seed": 0}
                    ]
                }
            }
        })
    );
}

#[test]
fn mapping_without_class_type_follows_exclude_rule() {
    let base = json!({
        "1": {"class_type": "KSampler", "inputs": {"seed": 1}},
        "2": {"class_type": "Foo", "seed": 2}
    });

    let mut excluded = object(base.clone());
    replace_key_value(&mut excluded, "seed", &json!(9), &ClassFilter::except(["Foo"]));
    assert_eq!(excluded["1"]["inputs"]["seed"], json!(9));
    assert_eq!(excluded["2"]["seed"], json!(2));

    let mut only = object(base);
    replace_key_value(&mut only, "seed", &json!(9), &ClassFilter::only(["KSampler"]));
    assert_eq!(only["1"]["inputs"]["seed"], json!(1));
    assert_eq!(only["2"]["seed"], json!(2));
}

#[test]
fn edit_continues_below_edited_node() {
    let mut graph = object(json!({
        "1": {"class_type": "A", "seed": 1, "child": {"class_type": "A", "seed": 2}}
    }));
    replace_key_value(&mut graph, "seed", &json!(5), &ClassFilter::only(["A"]));
    assert_eq!(graph["1"]["seed"], json!(5));
    assert_eq!(graph["1"]["child"]["seed"], json!(5));
}

#[test]
fn only_filter_skips_inputs_of_listed_class() {
    // `inputs` carries no class_type of its own, so an inclusion list never reaches it
    let base = JobGraph::from_value(json!({
        "3": {"class_type": "KSampler", "inputs": {"seed": 8566257, "steps": 20}},
        "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI"}}
    }))
    .unwrap();

    let mut only = base.clone();
    only.replace_key_value("seed", 42, &ClassFilter::only(["KSampler"]));
    assert_eq!(only, base);

    let mut all = base.clone();
    all.replace_key_value("seed", 42, &ClassFilter::all());
    assert_eq!(all.node("3").unwrap().input("seed"), Some(&json!(42)));
    assert_eq!(all.node("3").unwrap().input("steps"), Some(&json!(20)));
}
