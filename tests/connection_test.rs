// End-to-end flows over a recording driver
use tablekit::driver::{RecordingDriver, TxCall};
use tablekit::types::{Column, DataType, DbError, Payload, Row, TableSchema, Value};
use tablekit::{
    Connection, DeleteOptions, EngineConfig, InsertOptions, JoinSpec, SelectOptions, StaticSchemas, UpdateOptions,
    WhereSpec,
};

fn catalog() -> StaticSchemas {
    StaticSchemas::new(vec![
        TableSchema::new(
            "users",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("name", DataType::Varchar { length: 40 }),
                Column::new("email", DataType::Varchar { length: 80 }).nullable(),
                Column::new("zk_deleted", DataType::TinyInt),
            ],
        ),
        TableSchema::new(
            "messages",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("sender", DataType::Int).references("users", "id"),
                Column::new("recipient", DataType::Int).references("users", "id"),
                Column::new("body", DataType::Text),
            ],
        ),
        TableSchema::new(
            "posts",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("author", DataType::Int).references("users", "id"),
                Column::new("views", DataType::Int),
            ],
        ),
        TableSchema::new(
            "countries",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("code", DataType::Char { length: 2 }),
                Column::new("region", DataType::Varchar { length: 20 }).nullable(),
            ],
        ),
    ])
}

fn connection(config: EngineConfig) -> Connection<RecordingDriver> {
    Connection::new(RecordingDriver::new(), catalog(), config)
}

#[test]
fn test_user_lifecycle() {
    let mut config = EngineConfig::default();
    config.auto_hide.push("users".into());
    let mut conn = connection(config);

    let id = conn
        .insert("users", &Payload::new().set("name", "Ann").set("email", "ann@example.com"), &InsertOptions::new())
        .unwrap();
    assert_eq!(id, Some(1));

    conn.update("users", 1, &Payload::new().set("name", "Anna"), &UpdateOptions::new())
        .unwrap();

    conn.driver_mut().respond(
        "FROM `users`",
        vec![Row::new().with("id", "1").with("name", "Anna").with("email", "ann@example.com").with("zk_deleted", "0")],
    );
    let row = conn.select("users", 1, &SelectOptions::new()).unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&Value::from("Anna")));
    assert_eq!(row.get("id"), Some(&Value::Integer(1)));

    assert_eq!(conn.delete("users", 1, &DeleteOptions::new()).unwrap(), 1);

    let statements = conn.driver().statements();
    assert_eq!(
        statements,
        [
            "INSERT INTO `users`(`email`,`name`) VALUES('ann@example.com','Ann')",
            "UPDATE `users` `t` SET `t`.`name` = 'Anna' WHERE `t`.`id` = '1'",
            "SELECT `t`.* FROM `users` `t` WHERE (`t`.`id` = '1') AND `t`.`zk_deleted` = 0 LIMIT 1",
            "UPDATE `users` `t` SET `t`.`zk_deleted` = 1 WHERE `t`.`id` = '1'",
        ]
    );
    assert_eq!(
        conn.driver().transactions(),
        [
            TxCall::Begin,
            TxCall::Commit,
            TxCall::Begin,
            TxCall::Commit,
            TxCall::Begin,
            TxCall::Commit,
        ]
    );
}

#[test]
fn test_stale_version_is_rejected() {
    let mut conn = connection(EngineConfig::default());
    conn.driver_mut()
        .respond("FROM `model_version_locks`", vec![Row::new().with("version", "4")]);

    let err = conn
        .update("users", 1, &Payload::new().set("name", "x"), &UpdateOptions::new().version(3))
        .unwrap_err();
    match err {
        DbError::VersionConflict { table, row, given, latest } => {
            assert_eq!((table.as_str(), row.as_str(), given, latest), ("users", "1", 3, 4));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(conn.driver().matching("UPDATE `users`").is_empty());

    conn.update("users", 1, &Payload::new().set("name", "x"), &UpdateOptions::new().version(4))
        .unwrap();
    assert_eq!(conn.driver().matching("UPDATE `users`").len(), 1);
    assert_eq!(conn.driver().matching("INSERT INTO `model_version_locks`").len(), 1);
}

#[test]
fn test_deferred_inserts_share_one_statement() {
    let mut conn = connection(EngineConfig::default());
    let options = InsertOptions::new().defer(3);
    for name in ["a", "b", "c"] {
        conn.insert("users", &Payload::new().set("name", name), &options).unwrap();
    }

    let inserts = conn.driver().matching("INSERT");
    assert_eq!(inserts, ["INSERT INTO `users`(`name`) VALUES('a'),('b'),('c')"]);
}

#[test]
fn test_nested_transactions_commit_once() {
    let mut conn = connection(EngineConfig::default());
    conn.begin_transaction().unwrap();
    conn.begin_transaction().unwrap();
    conn.insert("posts", &Payload::new().set("author", 1).set("views", 0), &InsertOptions::new())
        .unwrap();
    assert!(conn.commit().unwrap());
    assert!(conn.in_transaction());
    assert_eq!(conn.driver().transactions(), [TxCall::Begin]);
    assert!(conn.commit().unwrap());
    assert!(!conn.in_transaction());
    assert!(!conn.commit().unwrap());
    assert_eq!(conn.driver().transactions(), [TxCall::Begin, TxCall::Commit]);

    conn.begin_transaction().unwrap();
    conn.begin_transaction().unwrap();
    assert!(conn.rollback().unwrap());
    assert!(!conn.in_transaction());
    // the outer commit has nothing left to commit
    assert!(!conn.commit().unwrap());
    assert_eq!(
        conn.driver().transactions(),
        [TxCall::Begin, TxCall::Commit, TxCall::Begin, TxCall::Rollback]
    );
}

#[test]
fn test_cached_reads_match_the_store_filter() {
    let mut config = EngineConfig::default();
    config.cached_tables.push("countries".into());
    let mut conn = connection(config);
    let stored = [("1", "IT", Some("south")), ("2", "FR", Some("west")), ("3", "DE", None), ("4", "ES", Some("south"))];
    conn.driver_mut().respond(
        "FROM `countries`",
        stored
            .iter()
            .map(|(id, code, region)| {
                let region = region.map_or(Value::Null, Value::from);
                Row::new().with("id", *id).with("code", *code).with("region", region)
            })
            .collect(),
    );

    let ids = |rows: Vec<Row>| -> Vec<i64> {
        let mut ids: Vec<i64> = rows.iter().filter_map(|r| r.get("id").and_then(Value::as_int)).collect();
        ids.sort_unstable();
        ids
    };

    let south = conn
        .select_all("countries", WhereSpec::new().eq("region", "SOUTH"), &SelectOptions::new())
        .unwrap();
    assert_eq!(ids(south), [1, 4]);

    let either = conn
        .select_all(
            "countries",
            WhereSpec::new().eq("code", "fr").eq("id", 3),
            &SelectOptions::new().or(),
        )
        .unwrap();
    assert_eq!(ids(either), [2, 3]);

    // NULL equality is answered by the store
    conn.select_all("countries", WhereSpec::new().eq("region", Value::Null), &SelectOptions::new())
        .unwrap();
    assert_eq!(conn.driver().matching("`t`.`region` IS NULL").len(), 1);

    assert_eq!(
        conn.count("countries", WhereSpec::new().eq("region", "south"), &SelectOptions::new()).unwrap(),
        2
    );
    assert_eq!(conn.stats().cache_reads.get("countries"), Some(&3));
}

#[test]
fn test_cached_rows_follow_writes() {
    const SELECTS: &str = "SELECT `t`.* FROM `countries`";
    let mut config = EngineConfig::default();
    config.cached_tables.push("countries".into());
    let mut conn = connection(config);
    let country = |id: &str, code: &str, region: Value| Row::new().with("id", id).with("code", code).with("region", region);
    let by_id = SelectOptions::new().order_by("id");

    conn.driver_mut().respond(
        "FROM `countries`",
        vec![country("10", "IT", Value::from("south")), country("11", "FR", Value::from("west"))],
    );
    assert_eq!(conn.select_all("countries", WhereSpec::new(), &by_id).unwrap().len(), 2);

    // the driver hands out id 1 to the insert, which is re-read by key
    conn.driver_mut()
        .respond("WHERE `t`.`id` = '1'", vec![country("1", "ES", Value::Null)]);
    let id = conn
        .insert("countries", &Payload::new().set("code", "ES"), &InsertOptions::new())
        .unwrap();
    assert_eq!(id, Some(1));
    conn.update("countries", 10, &Payload::new().set("region", "north"), &UpdateOptions::new())
        .unwrap();
    assert_eq!(conn.delete("countries", 11, &DeleteOptions::new()).unwrap(), 1);

    let cached = conn.select_all("countries", WhereSpec::new(), &by_id).unwrap();
    assert_eq!(conn.driver().matching(SELECTS).len(), 2);

    conn.driver_mut().respond(
        "FROM `countries`",
        vec![country("1", "ES", Value::Null), country("10", "IT", Value::from("north"))],
    );
    let stored = conn
        .select_all("countries", WhereSpec::new(), &by_id.clone().ignore_cache())
        .unwrap();
    assert_eq!(conn.driver().matching(SELECTS).len(), 3);
    assert_eq!(cached, stored);

    let north = conn
        .select_all("countries", WhereSpec::new().eq("region", "north"), &SelectOptions::new())
        .unwrap();
    assert_eq!(north, stored[1..].to_vec());
}

#[test]
fn test_join_inference_and_ambiguity() {
    let mut conn = connection(EngineConfig::default());

    let sql = conn
        .compile_select("posts", WhereSpec::new(), &SelectOptions::new().join(JoinSpec::new("users")))
        .unwrap();
    assert!(sql.contains("JOIN `users`"), "{sql}");
    assert!(sql.contains("`t`.`author`"), "{sql}");

    let err = conn
        .compile_select("messages", WhereSpec::new(), &SelectOptions::new().join(JoinSpec::new("users")))
        .unwrap_err();
    assert!(matches!(err, DbError::AmbiguousJoin { .. }));

    let sql = conn
        .compile_select(
            "messages",
            WhereSpec::new(),
            &SelectOptions::new().join(JoinSpec::new("users").on("recipient")),
        )
        .unwrap();
    assert!(sql.contains("`t`.`recipient`"), "{sql}");
}

#[test]
fn test_full_table_writes_need_confirmation() {
    let mut conn = connection(EngineConfig::default());
    assert!(matches!(
        conn.delete("posts", WhereSpec::new(), &DeleteOptions::new()),
        Err(DbError::ConfirmationRequired(_))
    ));
    assert_eq!(conn.delete("posts", WhereSpec::new(), &DeleteOptions::new().confirm()).unwrap(), 1);
    assert_eq!(conn.driver().statements(), ["DELETE `t` FROM `posts` `t`"]);
}
