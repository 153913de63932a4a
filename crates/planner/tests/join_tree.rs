use dsq_common::QualifiedName;
use dsq_planner::{
    build_two_table_join_tree, two_table_join, BinaryOp, JoinPair, JoinType, MultiSourceSelect,
    OrderBy, OrderByItem, QueriedRelation, QueriedTable, QuerySpec, RemainingOrderBy, Symbol,
    TwoTableJoin, WhereClause,
};
use indexmap::{IndexMap, IndexSet};

fn qn(s: &str) -> QualifiedName {
    QualifiedName::from_dotted(s)
}

fn eq(a: (&str, &str), b: (&str, &str)) -> Symbol {
    Symbol::BinaryOp {
        left: Box::new(Symbol::field(a.0, a.1)),
        op: BinaryOp::Eq,
        right: Box::new(Symbol::field(b.0, b.1)),
    }
}

fn table(name: &str, columns: &[&str]) -> (QualifiedName, QueriedRelation) {
    let outputs = columns.iter().map(|c| Symbol::field(name, *c)).collect();
    (
        qn(name),
        QueriedRelation::Table(QueriedTable::new(name, QuerySpec::new(outputs))),
    )
}

fn sources(tables: Vec<(QualifiedName, QueriedRelation)>) -> IndexMap<QualifiedName, QueriedRelation> {
    tables.into_iter().collect()
}

fn order_by(symbols: Vec<Symbol>) -> OrderBy {
    OrderBy::new(symbols.into_iter().map(OrderByItem::asc).collect())
}

fn remaining(symbols: Vec<Symbol>, relations: &[&str]) -> RemainingOrderBy {
    let relations: IndexSet<QualifiedName> = relations.iter().map(|n| qn(n)).collect();
    RemainingOrderBy::new(order_by(symbols), relations)
}

fn left_join(join: &TwoTableJoin) -> &TwoTableJoin {
    join.left.as_join().expect("left child is a join")
}

fn condition_of(join: &TwoTableJoin) -> String {
    join.pair
        .condition
        .as_ref()
        .expect("join condition present")
        .to_string()
}

fn order_by_strings(order_by: &Option<OrderBy>) -> Vec<String> {
    order_by
        .as_ref()
        .map(|o| o.symbols().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

// select * from t1 join t2 on t1.a = t2.b join t3 on t2.b = t3.c
// order by t1.a, t2.b, t3.c
#[test]
fn query_splitting_distributes_on_conditions() {
    let mut spec = QuerySpec::new(vec![
        Symbol::field("t1", "a"),
        Symbol::field("t2", "b"),
        Symbol::field("t3", "c"),
    ]);
    spec.order_by = Some(order_by(vec![
        Symbol::field("t1", "a"),
        Symbol::field("t2", "b"),
        Symbol::field("t3", "c"),
    ]));
    let mut mss = MultiSourceSelect::new(
        sources(vec![
            table("t1", &["a"]),
            table("t2", &["b"]),
            table("t3", &["c"]),
        ]),
        vec![
            JoinPair::new("t1", "t2", JoinType::Inner, Some(eq(("t1", "a"), ("t2", "b")))),
            JoinPair::new("t2", "t3", JoinType::Inner, Some(eq(("t2", "b"), ("t3", "c")))),
        ],
        spec,
    );
    mss.remaining_order_by = Some(remaining(
        vec![
            Symbol::field("t1", "a"),
            Symbol::field("t2", "b"),
            Symbol::field("t3", "c"),
        ],
        &["t1", "t2", "t3"],
    ));

    let root = build_two_table_join_tree(mss).unwrap();
    assert_eq!(root.name().to_string(), "join.join.t1.t2.t3");

    let inner = left_join(&root);
    assert_eq!(condition_of(inner), "(t1.a = t2.b)");
    assert_eq!(condition_of(&root), "(join.t1.t2.t2['b'] = t3.c)");

    // the order-by spanning all three relations lands on the root
    assert!(inner.remaining_order_by.is_none());
    assert!(root.remaining_order_by.is_some());
}

// select * from t1, t2, t3 where t3.c = t2.b order by t3.c
#[test]
fn where_fragment_reorders_relations() {
    let mut spec = QuerySpec::new(vec![
        Symbol::field("t1", "a"),
        Symbol::field("t2", "b"),
        Symbol::field("t3", "c"),
    ]);
    spec.where_clause = WhereClause::Query(eq(("t3", "c"), ("t2", "b")));
    spec.order_by = Some(order_by(vec![Symbol::field("t3", "c")]));
    let mut mss = MultiSourceSelect::new(
        sources(vec![
            table("t1", &["a"]),
            table("t2", &["b"]),
            table("t3", &["c"]),
        ]),
        vec![],
        spec,
    );
    mss.remaining_order_by = Some(remaining(vec![Symbol::field("t3", "c")], &["t3"]));

    let root = build_two_table_join_tree(mss).unwrap();
    let left = left_join(&root);
    assert_eq!(left.name().to_string(), "join.t3.t2");
    assert_eq!(
        left.spec.where_clause.query().map(ToString::to_string),
        Some("(t3.c = t2.b)".to_string())
    );
    assert_eq!(left.left.qualified_name(), &qn("t3"));
    // the fragment was consumed, nothing remains for the root
    assert_eq!(root.spec.where_clause, WhereClause::MatchAll);
}

// select * from t1 join t2 on t1.a = t2.b join t3 on t2.b = t3.c
// order by t3.c, t1.a, t2.b
#[test]
fn bad_relation_order_collects_conditions_at_the_root() {
    let mut spec = QuerySpec::new(vec![
        Symbol::field("t1", "a"),
        Symbol::field("t2", "b"),
        Symbol::field("t3", "c"),
    ]);
    spec.order_by = Some(order_by(vec![
        Symbol::field("t3", "c"),
        Symbol::field("t1", "a"),
        Symbol::field("t2", "b"),
    ]));
    let mut mss = MultiSourceSelect::new(
        sources(vec![
            table("t1", &["a"]),
            table("t2", &["b"]),
            table("t3", &["c"]),
        ]),
        vec![
            JoinPair::new("t1", "t2", JoinType::Inner, Some(eq(("t1", "a"), ("t2", "b")))),
            JoinPair::new("t2", "t3", JoinType::Inner, Some(eq(("t2", "b"), ("t3", "c")))),
        ],
        spec,
    );
    mss.remaining_order_by = Some(remaining(
        vec![
            Symbol::field("t3", "c"),
            Symbol::field("t1", "a"),
            Symbol::field("t2", "b"),
        ],
        &["t1", "t2", "t3"],
    ));

    let root = build_two_table_join_tree(mss).unwrap();
    assert_eq!(root.name().to_string(), "join.join.t3.t1.t2");

    let t3_and_t1 = left_join(&root);
    assert_eq!(t3_and_t1.name().to_string(), "join.t3.t1");
    assert_eq!(t3_and_t1.spec.where_clause, WhereClause::MatchAll);
    assert!(t3_and_t1.pair.condition.is_none());

    assert_eq!(
        condition_of(&root),
        "((join.t3.t1.t1['a'] = t2.b) AND (t2.b = join.t3.t1.t3['c']))"
    );
}

// select * from t1, t2 where t1.x = 1 or t2.y = 1 order by t1.x + t1.x
#[test]
fn copied_order_by_is_carried_on_both_levels() {
    let add = Symbol::BinaryOp {
        left: Box::new(Symbol::field("t1", "x")),
        op: BinaryOp::Plus,
        right: Box::new(Symbol::field("t1", "x")),
    };
    let (t1_name, mut t1) = table("t1", &["x"]);
    t1.spec_mut().order_by = Some(order_by(vec![add.clone()]));
    let mut spec = QuerySpec::new(vec![Symbol::field("t1", "x"), Symbol::field("t2", "y")]);
    spec.where_clause = WhereClause::Query(Symbol::Or(
        Box::new(Symbol::BinaryOp {
            left: Box::new(Symbol::field("t1", "x")),
            op: BinaryOp::Eq,
            right: Box::new(Symbol::Literal(dsq_planner::LiteralValue::Int64(1))),
        }),
        Box::new(Symbol::BinaryOp {
            left: Box::new(Symbol::field("t2", "y")),
            op: BinaryOp::Eq,
            right: Box::new(Symbol::Literal(dsq_planner::LiteralValue::Int64(1))),
        }),
    ));
    spec.order_by = Some(order_by(vec![add.clone()]));
    let mss = MultiSourceSelect::new(
        sources(vec![(t1_name, t1), table("t2", &["y"])]),
        vec![],
        spec,
    );

    let root = two_table_join(mss).unwrap();
    assert_eq!(
        order_by_strings(&root.spec.order_by),
        ["add(t1.x, t1.x)"]
    );
    assert_eq!(
        order_by_strings(&root.left.spec().order_by),
        ["add(t1.x, t1.x)"]
    );
    // copies, not a shared node
    assert_eq!(root.spec.order_by, root.left.spec().order_by);
}

// select * from t1 left join t2 on t1.a = t2.b order by t2.b
#[test]
fn order_by_on_nullable_side_moves_above_the_join() {
    let (t2_name, mut t2) = table("t2", &["b"]);
    t2.spec_mut().order_by = Some(order_by(vec![Symbol::field("t2", "b")]));
    let mut spec = QuerySpec::new(vec![Symbol::field("t1", "a"), Symbol::field("t2", "b")]);
    spec.order_by = Some(order_by(vec![Symbol::field("t2", "b")]));
    let mss = MultiSourceSelect::new(
        sources(vec![table("t1", &["a"]), (t2_name, t2)]),
        vec![JoinPair::new(
            "t1",
            "t2",
            JoinType::Left,
            Some(eq(("t1", "a"), ("t2", "b"))),
        )],
        spec,
    );

    let root = two_table_join(mss).unwrap();
    assert!(root.right.spec().order_by.is_none());
    assert_eq!(order_by_strings(&root.spec.order_by), ["t2.b"]);
}

// select * from t1 left join t2 on t1.a = t2.b left join t3 on t2.b = t3.c
// order by t2.b, t3.c
#[test]
fn three_table_outer_join_clears_nullable_order_by_per_level() {
    let (t2_name, mut t2) = table("t2", &["b"]);
    t2.spec_mut().order_by = Some(order_by(vec![Symbol::field("t2", "b")]));
    let (t3_name, mut t3) = table("t3", &["c"]);
    t3.spec_mut().order_by = Some(order_by(vec![Symbol::field("t3", "c")]));
    let mut spec = QuerySpec::new(vec![
        Symbol::field("t1", "a"),
        Symbol::field("t2", "b"),
        Symbol::field("t3", "c"),
    ]);
    spec.order_by = Some(order_by(vec![
        Symbol::field("t2", "b"),
        Symbol::field("t3", "c"),
    ]));
    let mss = MultiSourceSelect::new(
        sources(vec![table("t1", &["a"]), (t2_name, t2), (t3_name, t3)]),
        vec![
            JoinPair::new("t1", "t2", JoinType::Left, Some(eq(("t1", "a"), ("t2", "b")))),
            JoinPair::new("t2", "t3", JoinType::Left, Some(eq(("t2", "b"), ("t3", "c")))),
        ],
        spec,
    );

    let root = build_two_table_join_tree(mss).unwrap();
    // the outer-join constraint rejects the ORDER BY driven order [t2, t3, t1]
    assert_eq!(root.name().to_string(), "join.join.t1.t2.t3");

    let t1_and_t2 = left_join(&root);
    assert!(t1_and_t2.right.spec().order_by.is_none());
    assert_eq!(order_by_strings(&t1_and_t2.spec.order_by), ["t2.b"]);

    assert!(root.right.spec().order_by.is_none());
    assert_eq!(
        order_by_strings(&root.spec.order_by),
        ["join.t1.t2.t2['b']", "t3.c"]
    );
}

// four tables joined in a chain, with WHERE fragments that straddle the
// first two pairs and collapse onto the same key after the first join
#[test]
fn straddling_where_fragments_merge_after_key_collapse() {
    let mut spec = QuerySpec::new(vec![Symbol::field("t4", "w")]);
    spec.where_clause = WhereClause::Query(Symbol::And(
        Box::new(eq(("t1", "x"), ("t3", "z"))),
        Box::new(eq(("t2", "y"), ("t3", "z"))),
    ));
    spec.order_by = Some(order_by(vec![Symbol::field("t1", "q")]));
    let mut mss = MultiSourceSelect::new(
        sources(vec![
            table("t1", &["a", "x", "q"]),
            table("t2", &["b", "y"]),
            table("t3", &["c", "z"]),
            table("t4", &["d", "w"]),
        ]),
        vec![
            JoinPair::new("t1", "t2", JoinType::Inner, Some(eq(("t1", "a"), ("t2", "b")))),
            JoinPair::new("t2", "t3", JoinType::Inner, Some(eq(("t2", "b"), ("t3", "c")))),
            JoinPair::new("t3", "t4", JoinType::Inner, Some(eq(("t3", "c"), ("t4", "d")))),
        ],
        spec,
    );
    mss.remaining_order_by = Some(remaining(vec![Symbol::field("t1", "q")], &["t1"]));

    let root = build_two_table_join_tree(mss).unwrap();
    assert_eq!(root.name().to_string(), "join.join.join.t1.t2.t3.t4");

    let t1_t2_t3 = left_join(&root);
    let t1_t2 = left_join(t1_t2_t3);
    assert_eq!(condition_of(t1_t2), "(t1.a = t2.b)");

    // both straddling fragments became evaluable at the same node and were
    // AND-combined under the collapsed key
    assert_eq!(
        t1_t2_t3.spec.where_clause.query().map(ToString::to_string),
        Some("((join.t1.t2.t1['x'] = t3.z) AND (join.t1.t2.t2['y'] = t3.z))".to_string())
    );
    assert_eq!(condition_of(t1_t2_t3), "(join.t1.t2.t2['b'] = t3.c)");
    assert_eq!(condition_of(&root), "(join.join.t1.t2.t3.t3['c'] = t4.d)");

    // the terminal node keeps the user-facing projection
    assert_eq!(root.spec.outputs, vec![Symbol::field("t4", "w")]);
}

// a single-relation fragment never matches a pair exactly and lands on the
// root during finalization
#[test]
fn residual_fragment_is_attached_at_the_root() {
    let mut spec = QuerySpec::new(vec![
        Symbol::field("t1", "a"),
        Symbol::field("t2", "x"),
        Symbol::field("t3", "c"),
    ]);
    spec.where_clause = WhereClause::Query(Symbol::BinaryOp {
        left: Box::new(Symbol::field("t2", "x")),
        op: BinaryOp::Eq,
        right: Box::new(Symbol::Literal(dsq_planner::LiteralValue::Int64(1))),
    });
    let mss = MultiSourceSelect::new(
        sources(vec![
            table("t1", &["a"]),
            table("t2", &["x"]),
            table("t3", &["c"]),
        ]),
        vec![
            JoinPair::cross_join("t1", "t2"),
            JoinPair::cross_join("t2", "t3"),
        ],
        spec,
    );

    let root = build_two_table_join_tree(mss).unwrap();
    // the fragment's relation leads the chosen order; t2.x survives through
    // the first join and the fragment is applied at the root, re-anchored
    assert_eq!(left_join(&root).name().to_string(), "join.t2.t1");
    assert_eq!(
        root.spec.where_clause.query().map(ToString::to_string),
        Some("(join.t2.t1.t2['x'] = 1)".to_string())
    );
    assert_eq!(left_join(&root).spec.where_clause, WhereClause::MatchAll);
}

// a limit is not kept below the topmost filtering join
#[test]
fn limit_is_cleared_below_the_last_filter() {
    let mut spec = QuerySpec::new(vec![
        Symbol::field("t1", "q"),
        Symbol::field("t2", "b"),
        Symbol::field("t3", "q"),
    ]);
    spec.where_clause = WhereClause::Query(eq(("t1", "x"), ("t2", "y")));
    spec.order_by = Some(order_by(vec![
        Symbol::field("t3", "q"),
        Symbol::field("t1", "q"),
    ]));
    spec.limit = Some(10);
    let mut mss = MultiSourceSelect::new(
        sources(vec![
            table("t1", &["q", "x"]),
            table("t2", &["b", "y"]),
            table("t3", &["q"]),
        ]),
        vec![],
        spec,
    );
    mss.remaining_order_by = Some(remaining(
        vec![Symbol::field("t3", "q"), Symbol::field("t1", "q")],
        &["t3", "t1"],
    ));

    let root = build_two_table_join_tree(mss).unwrap();
    // order follows the ORDER BY prefix [t3, t1], so the {t1, t2} fragment
    // only becomes evaluable at the root
    assert_eq!(root.name().to_string(), "join.join.t3.t1.t2");
    assert!(root.spec.where_clause.is_filtering());
    assert_eq!(root.spec.limit, Some(10));
    assert_eq!(left_join(&root).spec.limit, None);
}
