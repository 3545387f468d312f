use pretty_assertions::assert_eq;
use rstest::rstest;

use schema_bridge::{
    emit_models, generate_sql, parse_ddl, DdlGenerator, Dialect, FieldDescriptor, RecordDescriptor, SemanticType,
};

fn every_type() -> RecordDescriptor {
    let mut record = RecordDescriptor::new("samples")
        .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key());
    for (i, semantic_type) in SemanticType::ALL.into_iter().enumerate() {
        record = record
            .with_field(FieldDescriptor::new(&format!("required_{}", i), semantic_type))
            .with_field(FieldDescriptor::new(&format!("optional_{}", i), semantic_type).nullable(true));
    }
    record
}

fn bank() -> Vec<RecordDescriptor> {
    vec![
        RecordDescriptor::new("CheckingAccount")
            .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
            .with_field(FieldDescriptor::new("user_id", SemanticType::Integer).references("User", "id"))
            .with_field(FieldDescriptor::new("balance", SemanticType::Float))
            .with_field(FieldDescriptor::new("iban", SemanticType::Text).unique()),
        RecordDescriptor::new("User")
            .with_field(FieldDescriptor::new("id", SemanticType::Integer).primary_key())
            .with_field(FieldDescriptor::new("name", SemanticType::Text).nullable(true))
            .with_field(FieldDescriptor::new("active", SemanticType::Boolean)),
    ]
}

fn composite() -> Vec<RecordDescriptor> {
    vec![
        RecordDescriptor::new("orders")
            .with_field(FieldDescriptor::new("region", SemanticType::Text).primary_key())
            .with_field(FieldDescriptor::new("number", SemanticType::Integer).primary_key())
            .with_field(FieldDescriptor::new("placed", SemanticType::Date)),
        RecordDescriptor::new("order_lines")
            .with_field(FieldDescriptor::new("line", SemanticType::Integer).primary_key())
            .with_field(FieldDescriptor::new("order_region", SemanticType::Text).references("orders", "region"))
            .with_field(FieldDescriptor::new("order_number", SemanticType::Integer).references("orders", "number"))
            .with_field(FieldDescriptor::new("note", SemanticType::Binary).nullable(true)),
    ]
}

fn by_name(mut descriptors: Vec<RecordDescriptor>) -> Vec<RecordDescriptor> {
    descriptors.sort_by(|a, b| a.name.cmp(&b.name));
    descriptors
}

#[rstest]
fn test_generated_ddl_parses_back_to_the_same_tables(
    #[values(Dialect::Sqlite, Dialect::Postgres, Dialect::MsSql, Dialect::MySql)] dialect: Dialect,
    #[values(vec![every_type()], bank(), composite())] schema: Vec<RecordDescriptor>,
) {
    let ddl = generate_sql(&schema, dialect).unwrap();
    let recovered = parse_ddl(&ddl, dialect).unwrap();

    assert!(recovered.is_clean(), "{:?}", recovered);
    assert_eq!(by_name(recovered.descriptors), by_name(schema));
}

#[rstest]
#[case(Dialect::Sqlite)]
#[case(Dialect::Postgres)]
#[case(Dialect::MsSql)]
#[case(Dialect::MySql)]
fn test_referenced_table_is_created_first(#[case] dialect: Dialect) {
    let script = DdlGenerator::new(dialect).generate(&bank()).unwrap();
    assert_eq!(script.tables(), vec!["User", "CheckingAccount"]);

    let recovered = parse_ddl(&script.to_sql(), dialect).unwrap();
    let names: Vec<&str> = recovered.descriptors.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["User", "CheckingAccount"]);
}

#[test]
fn test_parsed_ddl_emits_source_that_describes_it() {
    let ddl = "
        CREATE TABLE Benchmark (sedol NCHAR(7) PRIMARY KEY, name NVARCHAR(50), is_reit BIT NOT NULL)
        CREATE TABLE Holding (
            id BIGINT NOT NULL PRIMARY KEY,
            sedol NCHAR(7) NOT NULL,
            CONSTRAINT fk_sedol FOREIGN KEY (sedol) REFERENCES Benchmark (sedol)
        )
    ";
    let recovered = parse_ddl(ddl, Dialect::MsSql).unwrap();
    let source = emit_models(&recovered.descriptors).unwrap();

    assert!(source.contains("pub struct BenchmarkRow {"));
    assert!(source.contains("pub is_reit: bool,"));
    assert!(source.contains("pub name: Option<String>,"));
    assert!(source.contains("#[record(references = \"Benchmark.sedol\")]"));
    assert!(syn::parse_file(&source).is_ok());
}
