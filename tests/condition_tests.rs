use relmodel::adapter::PostgresAdapter;
use relmodel::condition::{CondValue, Predicate};
use relmodel::{Catalog, Condition, FieldInfo, FieldPath, ModelInfo, Operator, Query, SqlCompiler, Value};

fn leaf(node: &CondValue) -> (String, Operator, &Value) {
    match &node.predicate {
        Predicate::Leaf { path, operator, arg } => (path.to_string(), *operator, arg),
        Predicate::Nested(_) => panic!("expected a leaf, got {:?}", node),
    }
}

fn catalog() -> Catalog {
    Catalog::new()
        .with_model(
            ModelInfo::new("Partner")
                .with_field(FieldInfo::text("name"))
                .with_field(FieldInfo::integer("age"))
                .with_field(FieldInfo::many2one("parent", "Partner")),
        )
        .unwrap()
}

fn where_sql(cond: Condition) -> (String, Vec<Value>) {
    let catalog = catalog();
    let query = Query::new("Partner").fields(["id"]).filter(cond);
    let stmt = SqlCompiler::new(&catalog, &PostgresAdapter, &query)
        .unwrap()
        .select()
        .unwrap();
    let clause = stmt
        .sql
        .split_once(" WHERE ")
        .map(|(_, w)| w.to_string())
        .unwrap_or_default();
    (clause, stmt.args)
}

#[test]
fn test_empty_condition() {
    let cond = Condition::new();
    assert!(cond.is_empty());
    assert_eq!(cond.len(), 0);
    assert_eq!(cond.all_field_paths().count(), 0);
    assert!(!Condition::new().and("age", Operator::Equals, 1).is_empty());
}

#[test]
fn test_all_field_paths_is_transitive_and_unique() {
    let cond = Condition::new()
        .and("name", Operator::Equals, "a")
        .or_cond(
            Condition::new()
                .and("parent.name", Operator::Equals, "b")
                .and_not_cond(Condition::new().and("name", Operator::Like, "c")),
        );
    let paths: Vec<String> = cond.all_field_paths().map(ToString::to_string).collect();
    assert_eq!(paths, vec!["name", "parent.name"]);
}

#[test]
fn test_operator_names() {
    assert_eq!("=".parse::<Operator>().unwrap(), Operator::Equals);
    assert_eq!("NOT   ILIKE".parse::<Operator>().unwrap(), Operator::NotILike);
    assert_eq!("=like".parse::<Operator>().unwrap(), Operator::LikePattern);
    assert_eq!("is not null".parse::<Operator>().unwrap(), Operator::IsNotNull);
    assert!("~".parse::<Operator>().is_err());
}

#[test]
fn test_parse_flat_chain_keeps_order() {
    let cond = Condition::parse("age > 30 AND name = 'Bob' OR parent.age <= 70").unwrap();
    assert_eq!(cond.len(), 3);
    let nodes = cond.nodes();
    assert_eq!(leaf(&nodes[0]), ("age".to_string(), Operator::Greater, &Value::Integer(30)));
    assert!(!nodes[1].is_or);
    assert!(nodes[2].is_or);
    assert_eq!(leaf(&nodes[2]).0, "parent.age");
}

#[test]
fn test_parse_groups_and_negation() {
    let cond = Condition::parse("(age = 1 OR age = 2) AND NOT name = 'x'").unwrap();
    let (sql, args) = where_sql(cond);
    assert_eq!(
        sql,
        r#"("partner".age = ? OR "partner".age = ?) AND NOT "partner".name = ?"#
    );
    assert_eq!(args, vec![Value::Integer(1), Value::Integer(2), Value::from("x")]);
}

#[test]
fn test_parse_negated_group() {
    let cond = Condition::parse("NOT (age < 18 OR age > 65)").unwrap();
    assert_eq!(cond.len(), 1);
    assert!(cond.nodes()[0].is_not);
    assert!(matches!(cond.nodes()[0].predicate, Predicate::Nested(_)));
}

#[test]
fn test_parse_like_in_null_between() {
    let (sql, args) = where_sql(
        Condition::parse("name NOT LIKE 'A%' AND age IN (1, 2) AND parent IS NULL AND age BETWEEN 3 AND 4")
            .unwrap(),
    );
    assert_eq!(
        sql,
        r#"NOT "partner".name LIKE ? AND "partner".age IN (?, ?) AND "partner".parent_id IS NULL AND ("partner".age >= ? AND "partner".age <= ?)"#
    );
    assert_eq!(
        args,
        vec![
            Value::from("A%"),
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(4)
        ]
    );
}

#[test]
fn test_parse_literal_on_the_left() {
    let cond = Condition::parse("18 < age").unwrap();
    assert_eq!(leaf(&cond.nodes()[0]), ("age".to_string(), Operator::Greater, &Value::Integer(18)));
}

#[test]
fn test_parse_rejects_garbage() {
    for bad in ["", "age >", "age = 1 extra", "age = other_field", "name LIKE 'a' ESCAPE '!'"] {
        assert!(Condition::parse(bad).is_err(), "'{}' should not parse", bad);
    }
}

#[test]
fn test_field_path_segments() {
    let path = FieldPath::from("parent.parent.name");
    assert_eq!(path.len(), 3);
    assert_eq!(path.segments()[2], "name");
    assert_eq!(path.to_string(), "parent.parent.name");
}
