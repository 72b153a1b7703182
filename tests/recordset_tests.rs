use relmodel::core::DriverError;
use relmodel::methods::MethodCall;
use relmodel::{
    Condition, Database, Environment, FieldInfo, FieldMap, ModelError, ModelInfo, Operator, Query,
    RecordSet, Result, Row, Session, SqlExecutor, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// In-memory executor: records every statement and answers queries from
/// a script of canned row sets.
#[derive(Clone, Default)]
struct Recorder {
    log: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    script: Arc<Mutex<VecDeque<Vec<Row>>>>,
    affected: u64,
    fail: bool,
}

impl Recorder {
    fn answer(&self, rows: Vec<Row>) {
        self.script.lock().unwrap().push_back(rows);
    }

    fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().unwrap().clone()
    }

    fn last_sql(&self) -> String {
        self.statements().last().map(|(sql, _)| sql.clone()).unwrap_or_default()
    }
}

impl SqlExecutor for Recorder {
    fn execute(&self, sql: &str, args: &[Value]) -> std::result::Result<u64, DriverError> {
        self.log.lock().unwrap().push((sql.to_string(), args.to_vec()));
        if self.fail {
            return Err("connection reset".into());
        }
        Ok(self.affected)
    }

    fn query(&self, sql: &str, args: &[Value]) -> std::result::Result<Vec<Row>, DriverError> {
        self.log.lock().unwrap().push((sql.to_string(), args.to_vec()));
        if self.fail {
            return Err("connection reset".into());
        }
        Ok(self.script.lock().unwrap().pop_front().unwrap_or_default())
    }
}

fn env() -> Environment {
    let env = Environment::new();
    env.declare_model(
        ModelInfo::new("Partner")
            .with_field(FieldInfo::text("name").required())
            .with_field(FieldInfo::integer("age"))
            .with_field(FieldInfo::boolean("active"))
            .with_field(FieldInfo::many2one("parent", "Partner")),
    )
    .unwrap();
    env
}

fn database(driver: &str, recorder: &Recorder) -> Database {
    Database::new(driver, recorder.clone()).unwrap()
}

#[test]
fn test_create_returns_new_record() {
    let env = env();
    let recorder = Recorder::default();
    recorder.answer(vec![vec![Value::Integer(7)]]);
    let db = database("sqlite3", &recorder);
    let session = Session::new(&env, &db);

    let rs = session
        .create("Partner", &FieldMap::new().with("name", "Bob").with("age", 30))
        .unwrap();
    assert_eq!(rs.ids(), &[7]);
    assert_eq!(
        recorder.statements(),
        vec![(
            r#"INSERT INTO "partner" (name, age) VALUES (?, ?) RETURNING id"#.to_string(),
            vec![Value::from("Bob"), Value::Integer(30)]
        )]
    );
}

#[test]
fn test_create_without_returned_row_fails() {
    let env = env();
    let recorder = Recorder::default();
    let db = database("sqlite3", &recorder);
    let err = Session::new(&env, &db)
        .create("Partner", &FieldMap::new().with("name", "Bob"))
        .unwrap_err();
    assert!(matches!(err, ModelError::UnexpectedRowCount { rows: 0, .. }));
}

#[test]
fn test_search_collects_ids() {
    let env = env();
    let recorder = Recorder::default();
    recorder.answer(vec![vec![Value::Integer(3)], vec![Value::Integer(1)]]);
    let db = database("sqlite3", &recorder);
    let session = Session::new(&env, &db);

    let query = Query::new("Partner")
        .filter(Condition::new().and("age", Operator::Greater, 30))
        .order_by("name");
    let rs = session.search(&query).unwrap();
    assert_eq!(rs.ids(), &[3, 1]);
    assert_eq!(
        recorder.last_sql(),
        r#"SELECT "partner".id AS "id" FROM "partner" WHERE "partner".age > ? ORDER BY "partner".name"#
    );
}

#[test]
fn test_search_count() {
    let env = env();
    let recorder = Recorder::default();
    recorder.answer(vec![vec![Value::Integer(5)]]);
    let db = database("sqlite3", &recorder);

    let count = Session::new(&env, &db).search_count(&Query::new("Partner")).unwrap();
    assert_eq!(count, 5);
    assert!(recorder.last_sql().starts_with("SELECT COUNT(*) FROM (SELECT"));
}

#[test]
fn test_read_coerces_values() {
    let env = env();
    let recorder = Recorder::default();
    recorder.answer(vec![
        vec![Value::from("Alice"), Value::Integer(1), Value::Null],
        vec![Value::from("Bob"), Value::Integer(0), Value::from("Alice")],
    ]);
    let db = database("postgres", &recorder);
    let session = Session::new(&env, &db);

    let rs = session.browse("Partner", vec![1, 2]).unwrap();
    let records = session.read(&rs, &["name", "active", "parent.name"]).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("active"), Some(&Value::Boolean(true)));
    assert_eq!(records[0].get("parent.name"), Some(&Value::Null));
    assert_eq!(records[1].get("parent.name"), Some(&Value::from("Alice")));
    assert_eq!(records[1].keys().collect::<Vec<_>>(), vec!["name", "active", "parent.name"]);

    let (sql, args) = recorder.statements().remove(0);
    assert_eq!(
        sql,
        r#"SELECT "partner".name AS "name", "partner".active AS "active", "partner__parent_id".name AS "parent.name" FROM "partner" LEFT JOIN "partner" AS "partner__parent_id" ON "partner".parent_id = "partner__parent_id".id WHERE "partner".id IN ($1, $2) ORDER BY "partner".id"#
    );
    assert_eq!(args, vec![Value::Integer(1), Value::Integer(2)]);
}

#[test]
fn test_read_defaults_to_all_fields() {
    let env = env();
    let recorder = Recorder::default();
    recorder.answer(vec![vec![
        Value::Integer(1),
        Value::from("Alice"),
        Value::from("42"),
        Value::from("t"),
        Value::Null,
    ]]);
    let db = database("sqlite3", &recorder);
    let session = Session::new(&env, &db);

    let rs = session.browse("Partner", vec![1]).unwrap();
    let records = session.read(&rs, &[]).unwrap();
    assert_eq!(records[0].get("age"), Some(&Value::Integer(42)));
    assert_eq!(records[0].get("active"), Some(&Value::Boolean(true)));
    assert_eq!(records[0].len(), 5);
}

#[test]
fn test_read_unscannable_value_is_data_error() {
    let env = env();
    let recorder = Recorder::default();
    recorder.answer(vec![vec![Value::from("Alice"), Value::from("sometimes")]]);
    let db = database("sqlite3", &recorder);
    let session = Session::new(&env, &db);

    let rs = session.browse("Partner", vec![1]).unwrap();
    let err = session.read(&rs, &["name", "active"]).unwrap_err();
    assert!(matches!(err, ModelError::TypeMismatch(_)));

    recorder.answer(vec![vec![Value::from("Alice")]]);
    let err = session.read(&rs, &["name", "active"]).unwrap_err();
    assert!(err.is_data());
}

#[test]
fn test_write_and_unlink() {
    let env = env();
    let recorder = Recorder {
        affected: 2,
        ..Default::default()
    };
    let db = database("sqlite3", &recorder);
    let session = Session::new(&env, &db);
    let rs = session.browse("Partner", vec![1, 2]).unwrap();

    assert_eq!(session.write(&rs, &FieldMap::new().with("name", "Z")).unwrap(), 2);
    assert_eq!(
        recorder.statements()[0],
        (
            r#"UPDATE "partner" SET name = ? WHERE "partner".id IN (?, ?)"#.to_string(),
            vec![Value::from("Z"), Value::Integer(1), Value::Integer(2)]
        )
    );

    assert_eq!(session.unlink(&rs).unwrap(), 2);
    assert_eq!(recorder.last_sql(), r#"DELETE FROM "partner" WHERE "partner".id IN (?, ?)"#);
}

#[test]
fn test_empty_recordset_touches_nothing() {
    let env = env();
    let recorder = Recorder::default();
    let db = database("sqlite3", &recorder);
    let session = Session::new(&env, &db);
    let rs = session.browse("Partner", vec![]).unwrap();

    assert!(session.read(&rs, &["name"]).unwrap().is_empty());
    assert_eq!(session.write(&rs, &FieldMap::new().with("name", "Z")).unwrap(), 0);
    assert_eq!(session.unlink(&rs).unwrap(), 0);
    assert!(recorder.statements().is_empty());
}

#[test]
fn test_execution_error_keeps_context() {
    let env = env();
    let recorder = Recorder {
        fail: true,
        ..Default::default()
    };
    let db = database("postgres", &recorder);
    let session = Session::new(&env, &db);
    let rs = session.browse("Partner", vec![9]).unwrap();

    let err = session.unlink(&rs).unwrap_err();
    assert!(err.is_execution());
    let msg = err.to_string();
    assert!(msg.contains(r#"DELETE FROM "partner" WHERE "partner".id IN ($1)"#));
    assert!(msg.contains("[9]"));
    assert!(msg.contains("connection reset"));
}

fn count_adults(call: &MethodCall<'_>, rs: &RecordSet) -> Result<i64> {
    let Some(db) = call.database() else {
        return Err(ModelError::InvalidExpression("no database".into()));
    };
    let session = Session::new(call.env(), db);
    let query = rs.query().and_filter(Condition::new().and("age", Operator::GreaterOrEqual, 18));
    Ok(session.search_count(&query)? as i64)
}

#[test]
fn test_methods_reach_session_database() {
    let env = env();
    env.declare_method("Partner", "count_adults", count_adults).unwrap();
    env.bootstrap().unwrap();

    let recorder = Recorder::default();
    recorder.answer(vec![vec![Value::Integer(2)]]);
    let db = database("sqlite3", &recorder);
    let session = Session::new(&env, &db);
    let rs = session.browse("Partner", vec![1, 2, 3]).unwrap();

    assert_eq!(session.call(&rs, "count_adults", &[]).unwrap(), Value::Integer(2));
    assert!(recorder.last_sql().ends_with(
        r#"WHERE "partner".id IN (?, ?, ?) AND ("partner".age >= ?)) foo"#
    ));

    // Without a database the layer reports it.
    assert!(env.call(&rs, "count_adults", &[]).is_err());
}
