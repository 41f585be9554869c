//! UAC enumeration and IND search scenarios.
//!
//! Covers uniqueness and minimality of found combinations, the unary and
//! n-ary inclusion dependency paths, array handling, maximal-IND
//! subsumption, and the sampling-vs-exact mode split.

use refseeker::config::IndConfig;
use refseeker::model::{AttributeId, DatastorageId, ServerKind, ValueCell, ValueType};
use refseeker::pipeline::{CancelToken, IndFinder, UacFinder};
use refseeker::staging::{MemoryStaging, QueryInterface};

// ============================================================================
// Test Helpers
// ============================================================================

struct TableBuilder<'a> {
    staging: &'a mut MemoryStaging,
    datastorage: DatastorageId,
    attributes: Vec<AttributeId>,
    next_entry: u64,
}

impl<'a> TableBuilder<'a> {
    fn new(
        staging: &'a mut MemoryStaging,
        database: u64,
        name: &str,
        columns: &[(&str, ValueType)],
    ) -> Self {
        let datastorage = staging.add_datastorage(name, database, None);
        let attributes = columns
            .iter()
            .map(|(column, _)| staging.add_attribute(column, datastorage))
            .collect();
        TableBuilder {
            staging,
            datastorage,
            attributes,
            next_entry: 0,
        }
    }

    fn row(&mut self, values: &[&str], types: &[ValueType]) {
        self.next_entry += 1;
        for (i, (value, value_type)) in values.iter().zip(types.iter()).enumerate() {
            self.staging.add_value(ValueCell {
                attribute_id: self.attributes[i],
                entry_no: self.next_entry,
                value: (*value).to_string(),
                value_type: *value_type,
                length: value.chars().count() as u32,
                position: i as u32 + 1,
            });
        }
    }
}

fn int_row(builder: &mut TableBuilder<'_>, values: &[&str]) {
    let types = vec![ValueType::Int; values.len()];
    builder.row(values, &types);
}

fn new_database(staging: &mut MemoryStaging) -> u64 {
    let server = staging.add_server(ServerKind::Relational, "localhost", 5432);
    staging.add_database("testdb", server)
}

fn run_uac_finder(staging: &mut MemoryStaging, max_attributes: usize) {
    staging.finalize_ingest();
    let cancel = CancelToken::new();
    UacFinder::new(staging, max_attributes, &cancel)
        .run()
        .unwrap();
}

fn run_ind_finder(staging: &mut MemoryStaging, config: &IndConfig, seed: Option<u64>) {
    let cancel = CancelToken::new();
    let mut finder = IndFinder::new(staging, config, &cancel);
    if let Some(seed) = seed {
        finder = finder.with_seed(seed);
    }
    finder.run().unwrap();
}

// ============================================================================
// UAC Enumeration
// ============================================================================

#[test]
fn test_single_distinct_attribute_yields_one_unary_uac() {
    let mut staging = MemoryStaging::new();
    let database = new_database(&mut staging);
    let mut table = TableBuilder::new(&mut staging, database, "users", &[("id", ValueType::Int)]);
    for v in ["1", "2", "3"] {
        int_row(&mut table, &[v]);
    }
    run_uac_finder(&mut staging, 3);

    let uacs = staging.uacs();
    assert_eq!(uacs.len(), 1);
    assert_eq!(uacs[0].attribute_ids.len(), 1);
}

#[test]
fn test_uac_uniqueness_invariant() {
    let mut staging = MemoryStaging::new();
    let database = new_database(&mut staging);
    let mut table = TableBuilder::new(
        &mut staging,
        database,
        "t1",
        &[("id", ValueType::Int), ("name", ValueType::Str)],
    );
    table.row(&["1", "a"], &[ValueType::Int, ValueType::Str]);
    table.row(&["2", "a"], &[ValueType::Int, ValueType::Str]);
    table.row(&["3", "b"], &[ValueType::Int, ValueType::Str]);
    run_uac_finder(&mut staging, 3);

    for uac in staging.uacs() {
        let joint = staging.distinct_joint_count(&uac.attribute_ids).unwrap();
        let entries = staging.max_entry_no(&uac.attribute_ids).unwrap().unwrap();
        assert_eq!(joint, entries);
    }
}

#[test]
fn test_uac_minimality_suppresses_supersets() {
    let mut staging = MemoryStaging::new();
    let database = new_database(&mut staging);
    let mut table = TableBuilder::new(
        &mut staging,
        database,
        "t1",
        &[("id", ValueType::Int), ("name", ValueType::Str)],
    );
    table.row(&["1", "a"], &[ValueType::Int, ValueType::Str]);
    table.row(&["2", "a"], &[ValueType::Int, ValueType::Str]);
    table.row(&["3", "b"], &[ValueType::Int, ValueType::Str]);
    run_uac_finder(&mut staging, 3);

    // id is unique alone; (id, name) must be suppressed by minimality and
    // name alone is not unique.
    let uacs = staging.uacs();
    assert_eq!(uacs.len(), 1);
    assert_eq!(uacs[0].attribute_ids.len(), 1);

    // No emitted UAC is a strict superset of another.
    for a in &uacs {
        for b in &uacs {
            if a.id != b.id && a.datastorage_id == b.datastorage_id {
                let subset = b.attribute_ids.iter().all(|x| a.attribute_ids.contains(x));
                assert!(!subset, "UAC {:?} contains UAC {:?}", a.id, b.id);
            }
        }
    }
}

#[test]
fn test_all_array_datastorage_yields_no_uac() {
    let mut staging = MemoryStaging::new();
    let database = new_database(&mut staging);
    let storage = staging.add_datastorage("posts", database, None);
    let tags = staging.add_attribute("tags", storage);
    for (entry, value) in [(1, "a"), (1, "b"), (2, "c")] {
        staging.add_value(ValueCell {
            attribute_id: tags,
            entry_no: entry,
            value: value.to_string(),
            value_type: ValueType::Str,
            length: 1,
            position: 1,
        });
    }
    run_uac_finder(&mut staging, 3);
    assert!(staging.uacs().is_empty());
}

#[test]
fn test_empty_datastorage_is_not_an_error() {
    let mut staging = MemoryStaging::new();
    let database = new_database(&mut staging);
    let storage = staging.add_datastorage("empty", database, None);
    staging.add_attribute("ghost", storage);
    run_uac_finder(&mut staging, 3);
    assert!(staging.uacs().is_empty());
}

#[test]
fn test_incomplete_attribute_excluded() {
    let mut staging = MemoryStaging::new();
    let database = new_database(&mut staging);
    let storage = staging.add_datastorage("t", database, None);
    let full = staging.add_attribute("full", storage);
    let sparse = staging.add_attribute("sparse", storage);
    for entry in 1..=3u64 {
        staging.add_value(ValueCell {
            attribute_id: full,
            entry_no: entry,
            value: entry.to_string(),
            value_type: ValueType::Int,
            length: 1,
            position: 1,
        });
    }
    // sparse misses entry 3 and would otherwise be unique.
    for entry in 1..=2u64 {
        staging.add_value(ValueCell {
            attribute_id: sparse,
            entry_no: entry,
            value: (10 + entry).to_string(),
            value_type: ValueType::Int,
            length: 2,
            position: 2,
        });
    }
    run_uac_finder(&mut staging, 3);

    let uacs = staging.uacs();
    assert_eq!(uacs.len(), 1);
    assert_eq!(uacs[0].attribute_ids, vec![full]);
}

// ============================================================================
// Unary INDs
// ============================================================================

#[test]
fn test_shared_id_unary_ind() {
    let mut staging = MemoryStaging::new();
    let database = new_database(&mut staging);
    let mut t1 = TableBuilder::new(
        &mut staging,
        database,
        "t1",
        &[("id", ValueType::Int), ("name", ValueType::Str)],
    );
    t1.row(&["1", "a"], &[ValueType::Int, ValueType::Str]);
    t1.row(&["2", "a"], &[ValueType::Int, ValueType::Str]);
    t1.row(&["3", "b"], &[ValueType::Int, ValueType::Str]);
    let t1_id = t1.attributes[0];

    let mut t2 = TableBuilder::new(
        &mut staging,
        database,
        "t2",
        &[("fk", ValueType::Int), ("note", ValueType::Str)],
    );
    t2.row(&["1", "x"], &[ValueType::Int, ValueType::Str]);
    t2.row(&["2", "y"], &[ValueType::Int, ValueType::Str]);
    let t2_fk = t2.attributes[0];

    run_uac_finder(&mut staging, 3);
    run_ind_finder(&mut staging, &IndConfig::default(), None);

    let inds = staging.inds();
    let uacs = staging.uacs();
    let t1_uac = uacs
        .iter()
        .find(|u| u.attribute_ids == vec![t1_id])
        .expect("t1.id UAC");
    let ind = inds
        .iter()
        .find(|i| i.uac_id == t1_uac.id)
        .expect("t1.id should contain t2.fk");
    assert_eq!(ind.child_attribute_ids, vec![t2_fk]);

    // Positional coherence: equal lengths, single child datastorage,
    // child != parent datastorage.
    for ind in &inds {
        let uac = uacs.iter().find(|u| u.id == ind.uac_id).unwrap();
        assert_eq!(uac.attribute_ids.len(), ind.child_attribute_ids.len());
        assert_ne!(uac.datastorage_id, ind.child_datastorage_id);
    }
}

// ============================================================================
// N-ary INDs (composite keys)
// ============================================================================

fn composite_fixture(staging: &mut MemoryStaging) -> (AttributeId, AttributeId, Vec<AttributeId>) {
    let database = new_database(staging);
    let mut order_line = TableBuilder::new(
        staging,
        database,
        "order_line",
        &[
            ("order_id", ValueType::Int),
            ("line_no", ValueType::Int),
            ("qty", ValueType::Int),
        ],
    );
    int_row(&mut order_line, &["1", "1", "5"]);
    int_row(&mut order_line, &["1", "2", "5"]);
    int_row(&mut order_line, &["2", "2", "5"]);
    let ol_order = order_line.attributes[0];
    let ol_line = order_line.attributes[1];

    let mut payment = TableBuilder::new(
        staging,
        database,
        "payment",
        &[
            ("order_id", ValueType::Int),
            ("line_no", ValueType::Int),
            ("amount", ValueType::Float),
        ],
    );
    payment.row(
        &["1", "2", "9.9"],
        &[ValueType::Int, ValueType::Int, ValueType::Float],
    );
    let pay_attrs = payment.attributes.clone();
    (ol_order, ol_line, pay_attrs)
}

#[test]
fn test_composite_key_nary_ind_accepts_aligned_pairing_only() {
    let mut staging = MemoryStaging::new();
    let (ol_order, ol_line, pay_attrs) = composite_fixture(&mut staging);
    run_uac_finder(&mut staging, 3);
    run_ind_finder(&mut staging, &IndConfig::default(), Some(7));

    let uacs = staging.uacs();
    let composite = uacs
        .iter()
        .find(|u| u.attribute_ids == vec![ol_order, ol_line])
        .expect("composite UAC (order_id, line_no)");

    let inds = staging.inds();
    assert_eq!(inds.len(), 1, "only the aligned pairing survives");
    assert_eq!(inds[0].uac_id, composite.id);
    assert_eq!(inds[0].child_attribute_ids, vec![pay_attrs[0], pay_attrs[1]]);
}

#[test]
fn test_nary_ind_exact_containment_invariant() {
    let mut staging = MemoryStaging::new();
    composite_fixture(&mut staging);
    run_uac_finder(&mut staging, 3);
    run_ind_finder(&mut staging, &IndConfig::default(), Some(3));

    let uacs = staging.uacs();
    for ind in staging.inds() {
        let uac = uacs.iter().find(|u| u.id == ind.uac_id).unwrap();
        assert!(staging
            .nary_contained(&uac.attribute_ids, &ind.child_attribute_ids)
            .unwrap());
    }
}

// ============================================================================
// Arrays
// ============================================================================

#[test]
fn test_array_parent_degrades_to_unary_max_ind() {
    let mut staging = MemoryStaging::new();
    let server = staging.add_server(ServerKind::Document, "localhost", 27017);
    let database = staging.add_database("blog", server);

    let posts = staging.add_datastorage("posts", database, None);
    let post_id = staging.add_attribute("post_id", posts);
    let tags = staging.add_attribute("tags", posts);
    for (entry, id) in [(1u64, "1"), (2, "2")] {
        staging.add_value(ValueCell {
            attribute_id: post_id,
            entry_no: entry,
            value: id.to_string(),
            value_type: ValueType::Int,
            length: 1,
            position: 1,
        });
    }
    for (entry, tag) in [(1u64, "a"), (1, "b"), (2, "c")] {
        staging.add_value(ValueCell {
            attribute_id: tags,
            entry_no: entry,
            value: tag.to_string(),
            value_type: ValueType::Str,
            length: 1,
            position: 2,
        });
    }

    let tag_storage = staging.add_datastorage("tags", database, None);
    let tag_name = staging.add_attribute("name", tag_storage);
    for (entry, name) in [(1u64, "a"), (2, "b"), (3, "c")] {
        staging.add_value(ValueCell {
            attribute_id: tag_name,
            entry_no: entry,
            value: name.to_string(),
            value_type: ValueType::Str,
            length: 1,
            position: 1,
        });
    }

    run_uac_finder(&mut staging, 3);
    let config = IndConfig {
        speed_mode: 0,
        find_max_ind: true,
    };
    run_ind_finder(&mut staging, &config, Some(11));

    // The array attribute never enters a UAC.
    for uac in staging.uacs() {
        assert!(!uac.attribute_ids.contains(&tags));
    }

    // In maximal mode the array parent survives only as a degenerate
    // unary maximal IND.
    let max_inds = staging.max_inds();
    assert!(max_inds
        .iter()
        .any(|m| m.parent_attribute_ids == vec![tags]
            && m.child_attribute_ids == vec![tag_name]));
    for max_ind in &max_inds {
        if max_ind.parent_attribute_ids.contains(&tags) {
            assert_eq!(max_ind.parent_attribute_ids.len(), 1);
        }
    }
}

// ============================================================================
// Maximal INDs
// ============================================================================

#[test]
fn test_max_ind_subsumes_unary_parts() {
    let mut staging = MemoryStaging::new();
    let database = new_database(&mut staging);

    // Two identical 3x2 grids: the binary IND holds in both directions and
    // must subsume every unary part.
    let grid_attrs = {
        let mut grid = TableBuilder::new(
            &mut staging,
            database,
            "grid",
            &[("x", ValueType::Int), ("y", ValueType::Int)],
        );
        for x in 1..=3 {
            for y in 1..=2 {
                int_row(&mut grid, &[&x.to_string(), &y.to_string()]);
            }
        }
        grid.attributes.clone()
    };
    let copy_attrs = {
        let mut copy = TableBuilder::new(
            &mut staging,
            database,
            "copy",
            &[("cx", ValueType::Int), ("cy", ValueType::Int)],
        );
        for x in 1..=3 {
            for y in 1..=2 {
                int_row(&mut copy, &[&x.to_string(), &y.to_string()]);
            }
        }
        copy.attributes.clone()
    };

    run_uac_finder(&mut staging, 3);
    let config = IndConfig {
        speed_mode: 0,
        find_max_ind: true,
    };
    run_ind_finder(&mut staging, &config, Some(5));

    let max_inds = staging.max_inds();
    assert_eq!(max_inds.len(), 2, "one binary maximal IND per direction");
    assert!(max_inds.iter().any(|m| {
        m.parent_attribute_ids == grid_attrs && m.child_attribute_ids == copy_attrs
    }));
    assert!(max_inds.iter().any(|m| {
        m.parent_attribute_ids == copy_attrs && m.child_attribute_ids == grid_attrs
    }));
}

// ============================================================================
// Sampling vs exact verification
// ============================================================================

/// Parent: a 10x5 grid of (x, y) pairs with (10, 5) missing. Child: the same
/// pairs except two, plus the missing (10, 5) as a violating entry.
fn grid_fixture(staging: &mut MemoryStaging, with_violator: bool) -> (Vec<AttributeId>, Vec<AttributeId>) {
    let database = new_database(staging);
    let mut grid = TableBuilder::new(
        staging,
        database,
        "grid",
        &[("x", ValueType::Int), ("y", ValueType::Int)],
    );
    for x in 1..=10 {
        for y in 1..=5 {
            if (x, y) == (10, 5) {
                continue;
            }
            int_row(&mut grid, &[&x.to_string(), &y.to_string()]);
        }
    }
    let grid_attrs = grid.attributes.clone();

    let mut copy = TableBuilder::new(
        staging,
        database,
        "copy",
        &[("cx", ValueType::Int), ("cy", ValueType::Int)],
    );
    for x in 1..=10 {
        for y in 1..=5 {
            if (x, y) == (10, 5) || (x, y) == (1, 1) {
                continue;
            }
            int_row(&mut copy, &[&x.to_string(), &y.to_string()]);
        }
    }
    if with_violator {
        int_row(&mut copy, &["10", "5"]);
    }
    let copy_attrs = copy.attributes.clone();
    (grid_attrs, copy_attrs)
}

#[test]
fn test_exact_mode_rejects_violating_candidate() {
    let mut staging = MemoryStaging::new();
    let (grid_attrs, copy_attrs) = grid_fixture(&mut staging, true);
    run_uac_finder(&mut staging, 3);
    run_ind_finder(&mut staging, &IndConfig::default(), Some(1));

    let uacs = staging.uacs();
    let grid_uac = uacs.iter().find(|u| u.attribute_ids == grid_attrs).unwrap();
    assert!(
        !staging.inds().iter().any(|i| i.uac_id == grid_uac.id
            && i.child_attribute_ids == copy_attrs),
        "exact verification must catch the violating tuple"
    );
}

#[test]
fn test_sampling_mode_is_a_superset_filter() {
    // A true IND passes the sampling pre-test under every seed: each child
    // entry has a positional parent match, so no sample can refute it.
    for seed in 0..10 {
        let mut staging = MemoryStaging::new();
        let (grid_attrs, copy_attrs) = grid_fixture(&mut staging, false);
        run_uac_finder(&mut staging, 3);
        let config = IndConfig {
            speed_mode: 10,
            find_max_ind: false,
        };
        run_ind_finder(&mut staging, &config, Some(seed));
        let uacs = staging.uacs();
        let grid_uac = uacs.iter().find(|u| u.attribute_ids == grid_attrs).unwrap();
        assert!(
            staging.inds().iter().any(|i| i.uac_id == grid_uac.id
                && i.child_attribute_ids == copy_attrs),
            "true IND rejected under seed {seed}"
        );
    }
}

#[test]
fn test_sampling_mode_can_accept_what_exact_rejects() {
    // The violating entry is 1 of 49; with 3 samples most seeds miss it,
    // so sampling-only mode accepts the candidate that exact mode rejects.
    let mut accepted = 0;
    for seed in 0..20 {
        let mut staging = MemoryStaging::new();
        let (grid_attrs, copy_attrs) = grid_fixture(&mut staging, true);
        run_uac_finder(&mut staging, 3);
        let config = IndConfig {
            speed_mode: 10,
            find_max_ind: false,
        };
        run_ind_finder(&mut staging, &config, Some(seed));
        let uacs = staging.uacs();
        let grid_uac = uacs.iter().find(|u| u.attribute_ids == grid_attrs).unwrap();
        if staging.inds().iter().any(|i| i.uac_id == grid_uac.id
            && i.child_attribute_ids == copy_attrs)
        {
            accepted += 1;
        }
    }
    assert!(accepted > 0, "sampling never accepted the candidate");
}
