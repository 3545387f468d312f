use pretty_assertions::assert_eq;

use schema_bridge::config::ModelsConfig;
use schema_bridge::{
    delete_all, get_where, introspect, parse_ddl, provision, write, DatabaseConnection, Dialect, Error,
    ModelRegistry, Record, RecordModel, SqlConnection, SqlValue, WriteOptions,
};

#[derive(Debug, Clone, PartialEq, Record)]
pub struct UserRow {
    #[record(primary_key)]
    pub id: i64,
    pub name: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(table = "CheckingAccount")]
pub struct AccountRow {
    #[record(primary_key)]
    pub id: i64,
    #[record(references = "User.id")]
    pub user_id: i64,
    pub balance: f64,
}

const MODEL_SOURCE: &str = r#"
use schema_bridge::Record;

#[derive(Debug, Clone, PartialEq, Record)]
pub struct UserRow {
    #[record(primary_key)]
    pub id: i64,
    pub name: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(table = "CheckingAccount")]
pub struct AccountRow {
    #[record(primary_key)]
    pub id: i64,
    #[record(references = "User.id")]
    pub user_id: i64,
    pub balance: f64,
}

pub struct NotARecord {
    pub id: i64,
}
"#;

fn user(id: i64, name: Option<&str>, active: bool) -> UserRow {
    UserRow {
        id,
        name: name.map(str::to_string),
        active,
    }
}

async fn provisioned() -> DatabaseConnection {
    let descriptors = vec![AccountRow::descriptor().unwrap(), UserRow::descriptor().unwrap()];
    let mut connection = DatabaseConnection::connect_url("sqlite::memory:").await.unwrap();
    provision(&mut connection, &descriptors, Dialect::Sqlite).await.unwrap();
    connection
}

#[tokio::test]
async fn test_introspection_matches_the_parsed_script() {
    let descriptors = vec![AccountRow::descriptor().unwrap(), UserRow::descriptor().unwrap()];
    let mut connection = DatabaseConnection::connect_url("sqlite::memory:").await.unwrap();
    let script = provision(&mut connection, &descriptors, Dialect::Sqlite).await.unwrap();

    let from_catalog = introspect(&mut connection, Dialect::Sqlite).await.unwrap();
    let from_text = parse_ddl(&script.to_sql(), Dialect::Sqlite).unwrap();

    assert!(from_catalog.is_clean(), "{:?}", from_catalog);
    assert_eq!(from_catalog.descriptors, from_text.descriptors);
    assert_eq!(from_catalog.descriptor("User"), Some(&UserRow::descriptor().unwrap()));
    assert_eq!(
        from_catalog.descriptor("CheckingAccount"),
        Some(&AccountRow::descriptor().unwrap())
    );
}

#[tokio::test]
async fn test_write_then_read_back() {
    let mut connection = provisioned().await;

    let summary = write(
        &mut connection,
        Dialect::Sqlite,
        &[user(1, Some("ada"), true), user(2, None, false)],
        &WriteOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.updated, 0);

    let found: Vec<UserRow> = get_where(&mut connection, Dialect::Sqlite, &[("id", SqlValue::Integer(2))])
        .await
        .unwrap();
    assert_eq!(found, vec![user(2, None, false)]);

    let everyone: Vec<UserRow> = get_where(&mut connection, Dialect::Sqlite, &[]).await.unwrap();
    assert_eq!(everyone.len(), 2);
}

#[tokio::test]
async fn test_write_updates_and_deletes_by_key() {
    let mut connection = provisioned().await;
    write(
        &mut connection,
        Dialect::Sqlite,
        &[user(1, Some("ada"), true), user(2, Some("grace"), true)],
        &WriteOptions::default(),
    )
    .await
    .unwrap();

    let summary = write(
        &mut connection,
        Dialect::Sqlite,
        &[user(1, Some("ada lovelace"), false)],
        &WriteOptions::default().with_delete(),
    )
    .await
    .unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.deleted, 1);

    let everyone: Vec<UserRow> = get_where(&mut connection, Dialect::Sqlite, &[]).await.unwrap();
    assert_eq!(everyone, vec![user(1, Some("ada lovelace"), false)]);
}

#[tokio::test]
async fn test_foreign_keys_are_enforced() {
    let mut connection = provisioned().await;

    let orphan = AccountRow {
        id: 10,
        user_id: 99,
        balance: 12.5,
    };
    let result = write(&mut connection, Dialect::Sqlite, &[orphan.clone()], &WriteOptions::default()).await;
    assert!(matches!(result, Err(Error::DatabaseError(_)) | Err(Error::SqlxError(_))));

    write(&mut connection, Dialect::Sqlite, &[user(99, None, true)], &WriteOptions::default())
        .await
        .unwrap();
    write(&mut connection, Dialect::Sqlite, &[orphan.clone()], &WriteOptions::default())
        .await
        .unwrap();

    let accounts: Vec<AccountRow> = get_where(&mut connection, Dialect::Sqlite, &[("user_id", SqlValue::Integer(99))])
        .await
        .unwrap();
    assert_eq!(accounts, vec![orphan]);

    assert_eq!(delete_all::<AccountRow, _>(&mut connection, Dialect::Sqlite).await.unwrap(), 1);
    let rows = connection.fetch_all("SELECT COUNT(*) AS n FROM CheckingAccount", &[]).await.unwrap();
    assert_eq!(rows[0].decode::<i64>("n").unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_constraint_column_is_rejected() {
    let mut connection = provisioned().await;
    let result: schema_bridge::Result<Vec<UserRow>> =
        get_where(&mut connection, Dialect::Sqlite, &[("email", SqlValue::Null)]).await;
    assert!(matches!(result, Err(Error::ValidationError(_))));
}

#[test]
fn test_source_scan_agrees_with_the_derive() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("models.rs"), MODEL_SOURCE).unwrap();

    let config = ModelsConfig {
        paths: vec![dir.path().to_string_lossy().into_owned()],
        exclude_paths: None,
        recursive_scan: true,
    };
    let mut registry = ModelRegistry::new(&config);
    registry.scan_and_register().unwrap();

    assert_eq!(registry.get_models().len(), 2);
    assert_eq!(
        registry.to_descriptors().unwrap(),
        vec![UserRow::descriptor().unwrap(), AccountRow::descriptor().unwrap()]
    );
}
