//! Primary-key and foreign-key scoring behavior.

use refseeker::analyze::{
    moving_average_plateau, split_tokens, zscore_plateau, TableOracle, TokenWeights,
};
use refseeker::config::PrimaryKeyConfig;
use refseeker::model::{DatastorageId, ServerKind, ValueCell, ValueType};
use refseeker::pipeline::{CancelToken, FkScorer, IndFinder, PkScorer, UacFinder};
use refseeker::staging::{MemoryStaging, QueryInterface};

use proptest::prelude::*;
use std::collections::HashMap;

// ============================================================================
// Test Helpers
// ============================================================================

fn add_column(
    staging: &mut MemoryStaging,
    datastorage: DatastorageId,
    name: &str,
    value_type: ValueType,
    position: u32,
    values: &[&str],
) -> u64 {
    let attribute = staging.add_attribute(name, datastorage);
    for (i, value) in values.iter().enumerate() {
        staging.add_value(ValueCell {
            attribute_id: attribute,
            entry_no: i as u64 + 1,
            value: (*value).to_string(),
            value_type,
            length: value.chars().count() as u32,
            position,
        });
    }
    attribute
}

fn run_pk(staging: &mut MemoryStaging, config: &PrimaryKeyConfig) {
    staging.finalize_ingest();
    let cancel = CancelToken::new();
    UacFinder::new(staging, 3, &cancel).run().unwrap();
    PkScorer::new(staging, config, &cancel).run().unwrap();
}

// ============================================================================
// Primary-key components
// ============================================================================

#[test]
fn test_pk_components_for_simple_integer_key() {
    let mut staging = MemoryStaging::new();
    let server = staging.add_server(ServerKind::Relational, "localhost", 5432);
    let database = staging.add_database("shop", server);
    let customers = staging.add_datastorage("customers", database, None);
    let id = add_column(
        &mut staging,
        customers,
        "id",
        ValueType::Int,
        1,
        &["1", "2", "3"],
    );
    add_column(
        &mut staging,
        customers,
        "name",
        ValueType::Str,
        2,
        &["ann", "bob", "ann"],
    );
    run_pk(&mut staging, &PrimaryKeyConfig::default());

    let uacs = staging.uacs();
    let uac = uacs.iter().find(|u| u.attribute_ids == vec![id]).unwrap();
    let scores = uac.pk_scores.unwrap();
    assert!((scores.cardinality - 1.0).abs() < 1e-12);
    assert!((scores.value_length - 1.0).abs() < 1e-12);
    assert!((scores.position - 1.0).abs() < 1e-12);
    assert!((scores.name_suffix - 1.0).abs() < 1e-12);
    assert!((scores.datatype - 1.0).abs() < 1e-12);
    assert!((scores.hopf_total() - 4.0).abs() < 1e-12);
    assert!((scores.iris_total() - 5.0).abs() < 1e-12);

    let categories = uac.pk_categories.unwrap();
    assert_eq!(categories.hopf, 2);
    assert_eq!(categories.iris, 2);
}

#[test]
fn test_pk_value_length_forced_for_object_ids() {
    let mut staging = MemoryStaging::new();
    let server = staging.add_server(ServerKind::Document, "localhost", 27017);
    let database = staging.add_database("crm", server);
    let customers = staging.add_datastorage("customers", database, None);
    // 24-char ObjectIds would otherwise decay the value-length component.
    let id = add_column(
        &mut staging,
        customers,
        "_id",
        ValueType::ObjectId,
        1,
        &[
            "aaaaaaaaaaaaaaaaaaaaaaa1",
            "aaaaaaaaaaaaaaaaaaaaaaa2",
            "aaaaaaaaaaaaaaaaaaaaaaa3",
        ],
    );
    run_pk(&mut staging, &PrimaryKeyConfig::default());

    let uacs = staging.uacs();
    let uac = uacs.iter().find(|u| u.attribute_ids == vec![id]).unwrap();
    let scores = uac.pk_scores.unwrap();
    assert!((scores.value_length - 1.0).abs() < 1e-12);
    assert!((scores.datatype - 1.0).abs() < 1e-12);
}

#[test]
fn test_pk_mixed_types_zero_datatype() {
    let mut staging = MemoryStaging::new();
    let server = staging.add_server(ServerKind::Relational, "localhost", 5432);
    let database = staging.add_database("db", server);
    let storage = staging.add_datastorage("mixed", database, None);
    let attribute = staging.add_attribute("code", storage);
    let cells = [
        ("1", ValueType::Int),
        ("x", ValueType::Str),
        ("2", ValueType::Int),
    ];
    for (i, (value, value_type)) in cells.iter().enumerate() {
        staging.add_value(ValueCell {
            attribute_id: attribute,
            entry_no: i as u64 + 1,
            value: (*value).to_string(),
            value_type: *value_type,
            length: 1,
            position: 1,
        });
    }
    run_pk(&mut staging, &PrimaryKeyConfig::default());

    let uacs = staging.uacs();
    let uac = uacs
        .iter()
        .find(|u| u.attribute_ids == vec![attribute])
        .unwrap();
    assert_eq!(uac.pk_scores.unwrap().datatype, 0.0);
}

#[test]
fn test_pk_classification_orders_candidates() {
    let mut staging = MemoryStaging::new();
    let server = staging.add_server(ServerKind::Relational, "localhost", 5432);
    let database = staging.add_database("db", server);
    let storage = staging.add_datastorage("sessions", database, None);
    let user_id = add_column(
        &mut staging,
        storage,
        "user_id",
        ValueType::Int,
        1,
        &["1", "2", "3"],
    );
    let token = add_column(
        &mut staging,
        storage,
        "token",
        ValueType::Str,
        2,
        &["abcde", "fghij", "klmno"],
    );
    let blurb = add_column(
        &mut staging,
        storage,
        "blurb",
        ValueType::Str,
        3,
        &[
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaa1",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaa2",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaa3",
        ],
    );
    run_pk(&mut staging, &PrimaryKeyConfig::default());

    let uacs = staging.uacs();
    let category = |attr: u64| {
        uacs.iter()
            .find(|u| u.attribute_ids == vec![attr])
            .unwrap()
            .pk_categories
            .unwrap()
            .hopf
    };
    assert_eq!(category(user_id), 2, "leading id column wins");
    assert_eq!(category(token), 0);
    assert_eq!(category(blurb), 0);
}

// ============================================================================
// Foreign-key scoring
// ============================================================================

/// Two databases, each with an `orders.order_id` column over 1..=5.
fn identical_orders_fixture(staging: &mut MemoryStaging) -> (u64, u64) {
    let server = staging.add_server(ServerKind::Relational, "localhost", 5432);
    let db1 = staging.add_database("shop", server);
    let db2 = staging.add_database("archive", server);
    let orders1 = staging.add_datastorage("orders", db1, None);
    let orders2 = staging.add_datastorage("orders", db2, None);
    let values = ["1", "2", "3", "4", "5"];
    let parent = add_column(staging, orders1, "order_id", ValueType::Int, 1, &values);
    let child = add_column(staging, orders2, "order_id", ValueType::Int, 1, &values);
    (parent, child)
}

fn run_full_scoring(staging: &mut MemoryStaging) {
    staging.finalize_ingest();
    let cancel = CancelToken::new();
    UacFinder::new(staging, 3, &cancel).run().unwrap();
    IndFinder::new(staging, &refseeker::config::IndConfig::default(), &cancel)
        .with_seed(2)
        .run()
        .unwrap();
    PkScorer::new(staging, &PrimaryKeyConfig::default(), &cancel)
        .run()
        .unwrap();
    let oracle = refseeker::analyze::NullOracle;
    FkScorer::new(staging, &oracle, &cancel).run().unwrap();
}

#[test]
fn test_fk_identical_names_and_distributions_score_one() {
    let mut staging = MemoryStaging::new();
    let (parent, child) = identical_orders_fixture(&mut staging);
    run_full_scoring(&mut staging);

    let uacs = staging.uacs();
    let parent_uac = uacs.iter().find(|u| u.attribute_ids == vec![parent]).unwrap();
    let inds = staging.inds();
    let ind = inds
        .iter()
        .find(|i| i.uac_id == parent_uac.id && i.child_attribute_ids == vec![child])
        .expect("identical columns form an IND");
    let scores = ind.fk_scores.unwrap();

    assert!((scores.name_weighted_similarity - 1.0).abs() < 1e-9);
    assert!((scores.distribution_similarity - 1.0).abs() < 1e-9);
    assert!((scores.iris_similarity - 1.0).abs() < 1e-9);
    assert!((scores.hybrid_similarity - 1.0).abs() < 1e-9);
    assert!((scores.hopf_probability - 1.0).abs() < 1e-9);
    assert!((scores.hybrid_probability - 1.0).abs() < 1e-9);
}

#[test]
fn test_fk_scores_stay_in_unit_interval() {
    let mut staging = MemoryStaging::new();
    let server = staging.add_server(ServerKind::Relational, "localhost", 5432);
    let db1 = staging.add_database("db1", server);
    let db2 = staging.add_database("db2", server);
    let left = staging.add_datastorage("products", db1, None);
    let right = staging.add_datastorage("inventory", db2, None);
    let sku = add_column(
        &mut staging,
        left,
        "sku",
        ValueType::Str,
        1,
        &["ax-1", "bx-2", "cx-3", "dx-4"],
    );
    add_column(
        &mut staging,
        right,
        "product_code",
        ValueType::Str,
        1,
        &["ax-1", "bx-2"],
    );
    run_full_scoring(&mut staging);

    let uacs = staging.uacs();
    let parent_uac = uacs.iter().find(|u| u.attribute_ids == vec![sku]).unwrap();
    let inds = staging.inds();
    let ind = inds.iter().find(|i| i.uac_id == parent_uac.id).unwrap();
    let scores = ind.fk_scores.unwrap();

    for value in [
        scores.name_weighted_similarity,
        scores.distribution_similarity,
        scores.iris_similarity,
        scores.hybrid_similarity,
        scores.hopf_probability,
        scores.iris_probability,
        scores.hybrid_only_name_probability,
        scores.hybrid_probability,
    ] {
        assert!((0.0..=1.0 + 1e-9).contains(&value), "score {value} out of range");
    }

    // Composite probabilities are the specified averages.
    assert!(
        (scores.hopf_probability
            - (scores.distribution_similarity + scores.name_weighted_similarity) / 2.0)
            .abs()
            < 1e-12
    );
    assert!((scores.iris_probability - scores.iris_similarity).abs() < 1e-12);
    assert!((scores.hybrid_only_name_probability - scores.hybrid_similarity).abs() < 1e-12);
    assert!(
        (scores.hybrid_probability
            - (scores.distribution_similarity + scores.hybrid_similarity) / 2.0)
            .abs()
            < 1e-12
    );
}

#[test]
fn test_semantic_similarity_scaled_below_threshold() {
    // The oracle output is scaled by 1/100 before the 0.7 threshold, so
    // even a perfect synonym falls back to the syntactic ratio.
    let mut staging = MemoryStaging::new();
    let server = staging.add_server(ServerKind::Relational, "localhost", 5432);
    let db1 = staging.add_database("db1", server);
    let db2 = staging.add_database("db2", server);
    let left = staging.add_datastorage("garage", db1, None);
    let right = staging.add_datastorage("lot", db2, None);
    let car = add_column(
        &mut staging,
        left,
        "car",
        ValueType::Str,
        1,
        &["a", "b", "c"],
    );
    add_column(&mut staging, right, "auto", ValueType::Str, 1, &["a", "b"]);

    staging.finalize_ingest();
    let cancel = CancelToken::new();
    UacFinder::new(&mut staging, 3, &cancel).run().unwrap();
    IndFinder::new(&mut staging, &refseeker::config::IndConfig::default(), &cancel)
        .with_seed(4)
        .run()
        .unwrap();
    PkScorer::new(&mut staging, &PrimaryKeyConfig::default(), &cancel)
        .run()
        .unwrap();
    let mut oracle = TableOracle::new();
    oracle.insert("car", "auto", 1.0);
    FkScorer::new(&mut staging, &oracle, &cancel).run().unwrap();

    let uacs = staging.uacs();
    let parent_uac = uacs.iter().find(|u| u.attribute_ids == vec![car]).unwrap();
    let inds = staging.inds();
    let ind = inds.iter().find(|i| i.uac_id == parent_uac.id).unwrap();
    let scores = ind.fk_scores.unwrap();

    // normalized_levenshtein("car", "auto") = 0; the semantic path yields
    // 1.0 / 100 = 0.01 < 0.7 and is discarded, falling back to 0.
    assert!(scores.iris_similarity.abs() < 1e-9);
}

// ============================================================================
// Shared algorithm properties
// ============================================================================

proptest! {
    #[test]
    fn prop_plateau_detectors_return_members(values in prop::collection::vec(0.0f64..10.0, 1..40)) {
        let z = zscore_plateau(&values);
        prop_assert!(values.iter().any(|v| (*v - z).abs() < 1e-12));
        let ma = moving_average_plateau(&values);
        prop_assert!(values.iter().any(|v| (*v - ma).abs() < 1e-12));
    }

    #[test]
    fn prop_token_weight_roundtrip(counts in prop::collection::hash_map("[a-z]{1,6}", 1u64..50, 1..12)) {
        let total: u64 = counts.values().sum();
        let weights = TokenWeights::from_counts(&counts);
        // For every token, count * e^w(t) recovers the vocabulary total,
        // and e^-w sums to one over the vocabulary.
        let mut inverse_sum = 0.0;
        for (token, count) in &counts {
            let weight = weights.weight(token);
            prop_assert!((*count as f64 * weight.exp() - total as f64).abs() < 1e-6 * total as f64);
            inverse_sum += (-weight).exp();
        }
        prop_assert!((inverse_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn prop_split_tokens_never_empty_tokens(name in "[a-zA-Z0-9_ .$-]{0,24}") {
        let tokens = split_tokens(&name);
        prop_assert!(tokens.iter().all(|t| !t.is_empty()));
    }
}

#[test]
fn test_token_weights_vocabulary() {
    let mut counts = HashMap::new();
    counts.insert("order".to_string(), 3u64);
    counts.insert("id".to_string(), 6u64);
    counts.insert("qty".to_string(), 1u64);
    let weights = TokenWeights::from_counts(&counts);
    assert_eq!(weights.len(), 3);
    assert!(weights.weight("qty") > weights.weight("order"));
    assert!(weights.weight("order") > weights.weight("id"));
}
