use notebox_core::{
    Command, CommandExecutor, ExecutorError, ProtocolError, Record, ResultMessage, StoreConfig,
};
use serde_json::{json, Value};

fn serve(executor: &mut CommandExecutor, message: Value) -> ResultMessage {
    executor.handle_text(&message.to_string()).unwrap()
}

fn data(result: ResultMessage) -> Value {
    assert_eq!(result.error, None, "unexpected error result: {result:?}");
    result.data
}

#[test]
fn json_scenario_runs_end_to_end() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());

    let init = serve(&mut executor, json!({"id": 1, "kind": "init"}));
    assert_eq!(init.id, 1);
    assert_eq!(data(init), json!(true));

    let created = data(serve(
        &mut executor,
        json!({"id": 2, "kind": "create", "payload": {"title": "Groceries", "notes": "milk"}}),
    ));
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created, json!({"id": id, "title": "Groceries", "notes": "milk"}));

    let read = data(serve(
        &mut executor,
        json!({"id": 3, "kind": "read", "payload": id}),
    ));
    assert_eq!(read, created);

    let updated = data(serve(
        &mut executor,
        json!({"id": 4, "kind": "update", "payload": {"id": id, "title": "Groceries", "notes": "milk, eggs"}}),
    ));
    assert_eq!(updated["notes"], "milk, eggs");

    let filtered = data(serve(
        &mut executor,
        json!({"id": 5, "kind": "filter", "payload": "Groc"}),
    ));
    assert_eq!(filtered, json!([updated]));

    let deleted = data(serve(
        &mut executor,
        json!({"id": 6, "kind": "delete", "payload": id}),
    ));
    assert_eq!(deleted, json!(id));

    let listed = data(serve(&mut executor, json!({"id": 7, "kind": "listAll"})));
    assert_eq!(listed, json!([]));

    let missing = data(serve(
        &mut executor,
        json!({"id": 8, "kind": "read", "payload": id}),
    ));
    assert_eq!(missing, Value::Null);
}

#[test]
fn commands_before_init_fail_with_not_initialized() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());

    let result = serve(&mut executor, json!({"id": 9, "kind": "listAll"}));
    assert_eq!(result.id, 9);
    assert_eq!(result.data, Value::Null);
    assert_eq!(result.error.unwrap().code, "not_initialized");
    assert!(!executor.is_initialized());
}

#[test]
fn repeated_init_is_a_successful_no_op() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());
    executor.execute(Command::Init).unwrap();
    executor
        .execute(Command::Create(Record::new("kept", "")))
        .unwrap();

    assert_eq!(executor.execute(Command::Init).unwrap(), json!(true));
    let listed = executor.execute(Command::ListAll).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[test]
fn unknown_kind_is_reported_against_its_id() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());

    let result = serve(&mut executor, json!({"id": 10, "kind": "compact"}));
    assert_eq!(result.id, 10);
    let error = result.error.unwrap();
    assert_eq!(error.code, "unknown_command");
    assert!(error.message.contains("compact"));
}

#[test]
fn invalid_payload_is_reported_against_its_id() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());
    serve(&mut executor, json!({"id": 1, "kind": "init"}));

    let result = serve(
        &mut executor,
        json!({"id": 11, "kind": "read", "payload": "not-a-number"}),
    );
    assert_eq!(result.id, 11);
    assert_eq!(result.error.unwrap().code, "invalid_payload");
}

#[test]
fn unattributable_text_is_a_protocol_error() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());

    assert!(matches!(
        executor.handle_text("not json"),
        Err(ProtocolError::Malformed(_))
    ));
    assert!(matches!(
        executor.handle_text(r#"{"kind": "init"}"#),
        Err(ProtocolError::MissingCorrelationId)
    ));
}

#[test]
fn duplicate_create_is_a_write_error_and_executor_keeps_serving() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());
    executor.execute(Command::Init).unwrap();
    let created = executor
        .execute(Command::Create(Record::new("first", "")))
        .unwrap();
    let id = created["id"].as_i64().unwrap();

    let err = executor
        .execute(Command::Create(Record::new("again", "").with_id(id)))
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Store(_)));
    assert_eq!(err.code(), "write_error");

    let read = executor.execute(Command::Read(id)).unwrap();
    assert_eq!(read["title"], "first");
}

#[test]
fn update_without_id_is_rejected() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());
    executor.execute(Command::Init).unwrap();

    let err = executor
        .execute(Command::Update(Record::new("no id", "")))
        .unwrap_err();
    assert_eq!(err.code(), "missing_id");
}

#[test]
fn shutdown_releases_store_until_next_init() {
    let mut executor = CommandExecutor::new(StoreConfig::in_memory());
    executor.execute(Command::Init).unwrap();
    executor.shutdown();
    assert!(!executor.is_initialized());

    let err = executor.execute(Command::ListAll).unwrap_err();
    assert_eq!(err.code(), "not_initialized");

    executor.execute(Command::Init).unwrap();
    assert!(executor.is_initialized());
}
