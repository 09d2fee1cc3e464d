// tests/classify_tests.rs
//
// Tertile classification and cost-shape derivation against a YAML table.

use std::collections::BTreeMap;

use aoi_cache::classify::{classify, derive_cost_shapes, ScoreTable};
use aoi_cache::config::Config;
use aoi_cache::error::ScoreError;
use aoi_cache::types::{Category, Tier};

const NINE: &str = r#"
parameters:
  - { name: a, volatility: 0.9, criticality: 0.9 }
  - { name: b, volatility: 0.8, criticality: 0.5 }
  - { name: c, volatility: 0.7, criticality: 0.1 }
  - { name: d, volatility: 0.6, criticality: 0.8 }
  - { name: e, volatility: 0.5, criticality: 0.4 }
  - { name: f, volatility: 0.4, criticality: 0.2 }
  - { name: g, volatility: 0.3, criticality: 0.7 }
  - { name: h, volatility: 0.2, criticality: 0.6 }
  - { name: i, volatility: 0.1, criticality: 0.3 }
"#;

#[test]
fn nine_parameters_fill_all_nine_categories() {
    let table = ScoreTable::from_yaml_str(NINE).unwrap();
    let classification = classify(&table);

    assert_eq!(classification.len(), 9);
    assert_eq!(
        classification.category_of("a"),
        Some(Category::new(Tier::High, Tier::High))
    );
    assert_eq!(
        classification.category_of("c"),
        Some(Category::new(Tier::High, Tier::Low))
    );
    assert_eq!(
        classification.category_of("h"),
        Some(Category::new(Tier::Low, Tier::Medium))
    );
    assert_eq!(classification.groups().len(), 9);
    assert_eq!(classification.category_of("zzz"), None);
}

#[test]
fn classification_ignores_input_order() {
    let table = ScoreTable::from_yaml_str(NINE).unwrap();
    let mut reversed = table.clone();
    reversed.parameters.reverse();
    assert_eq!(classify(&table), classify(&reversed));
}

#[test]
fn cost_shapes_stay_inside_target_ranges() {
    let cfg = Config::default();
    let table = ScoreTable::from_yaml_str(NINE).unwrap();
    let shapes = derive_cost_shapes(&table, &classify(&table), &cfg.shaping).unwrap();

    let (a_lo, a_hi) = cfg.shaping.alpha_range;
    let (b_lo, b_hi) = cfg.shaping.beta_range;
    for (category, shape) in &shapes {
        assert!(shape.alpha >= a_lo - 1e-12 && shape.alpha <= a_hi + 1e-12, "{category}");
        assert!(shape.beta >= b_lo - 1e-12 && shape.beta <= b_hi + 1e-12, "{category}");
    }

    // Singleton groups: a holds both global maxima, i the volatility minimum.
    let hh = shapes[&Category::new(Tier::High, Tier::High)];
    assert!((hh.alpha - a_hi).abs() < 1e-12);
    assert!((hh.beta - b_hi).abs() < 1e-12);
    let lm = shapes[&Category::new(Tier::Low, Tier::Medium)];
    assert!(lm.alpha > a_lo);
}

#[test]
fn group_means_are_rescaled_globally() {
    let cfg = Config::default();
    // Two parameters share High-High; their means drive the shape.
    let yaml = r#"
parameters:
  - { name: p, volatility: 1.0, criticality: 1.0 }
  - { name: q, volatility: 0.5, criticality: 0.5 }
  - { name: r, volatility: 0.0, criticality: 0.0 }
"#;
    let table = ScoreTable::from_yaml_str(yaml).unwrap();
    let classification = classify(&table);
    let shapes = derive_cost_shapes(&table, &classification, &cfg.shaping).unwrap();

    let by_cat: BTreeMap<_, _> = classification.groups();
    assert_eq!(by_cat.len(), 3);
    let mid = shapes[&Category::new(Tier::Medium, Tier::Medium)];
    assert!((mid.alpha - (1.1 + 0.5 * (3.0 - 1.1))).abs() < 1e-12);
    assert!((mid.beta - (0.1 + 0.5 * (1.5 - 0.1))).abs() < 1e-12);
}

#[test]
fn identical_scores_map_to_range_minimum() {
    let cfg = Config::default();
    let yaml = r#"
parameters:
  - { name: x, volatility: 0.3, criticality: 0.3 }
  - { name: y, volatility: 0.3, criticality: 0.3 }
  - { name: z, volatility: 0.3, criticality: 0.3 }
"#;
    let table = ScoreTable::from_yaml_str(yaml).unwrap();
    let shapes = derive_cost_shapes(&table, &classify(&table), &cfg.shaping).unwrap();
    for shape in shapes.values() {
        assert_eq!(shape.alpha, cfg.shaping.alpha_range.0);
        assert_eq!(shape.beta, cfg.shaping.beta_range.0);
    }
}

#[test]
fn malformed_tables_are_rejected() {
    assert!(matches!(
        ScoreTable::from_yaml_str("parameters: []"),
        Err(ScoreError::Empty)
    ));
    assert!(matches!(
        ScoreTable::from_yaml_str("parameters: [{ name: a, volatility: oops, criticality: 1 }]"),
        Err(ScoreError::Parse(_))
    ));
    let dup = "parameters: [{ name: a, volatility: 1, criticality: 1 }, { name: a, volatility: 2, criticality: 2 }]";
    assert!(matches!(
        ScoreTable::from_yaml_str(dup),
        Err(ScoreError::DuplicateParameter(name)) if name == "a"
    ));
}

#[test]
fn demo_score_file_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/scores.yaml");
    let table = ScoreTable::from_yaml_file(path).unwrap();
    assert_eq!(table.len(), 18);
    assert_eq!(classify(&table).len(), 18);
}
