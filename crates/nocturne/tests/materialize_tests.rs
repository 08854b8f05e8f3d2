use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::NaiveDate;
use nocturne::nocturne_sql::memory::MemoryCursor;
use nocturne::nocturne_sql::{Column, Row, SqlType, SqlValue};
use nocturne::{
    ColumnNaming, ConverterRegistry, Error, Materializer, NameMapper, Session, SessionConfig, Shape,
};

#[derive(Debug, Default, PartialEq, Shape)]
struct Person {
    id: i32,
    name: String,
}

#[derive(Debug, PartialEq, Shape)]
#[shape(immutable, name = "Point")]
struct ImmutablePoint {
    x: i64,
    y: i64,
}

#[derive(Debug, Clone, PartialEq)]
struct Sku(String);

impl FromStr for Sku {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("SKU-") {
            Ok(Sku(s.to_string()))
        } else {
            Err(format!("not a SKU: {}", s))
        }
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default, PartialEq, Shape)]
struct Product {
    #[shape(column = "PRODUCT_CODE")]
    sku: Option<Sku>,
    released: Option<NaiveDate>,
    price: f64,
    #[shape(skip)]
    note: String,
}

fn person_columns() -> Vec<Column> {
    vec![
        Column::new("ID", SqlType::Integer),
        Column::new("NAME", SqlType::Varchar),
        Column::new("EXTRA", SqlType::Varchar),
    ]
}

#[test]
fn test_unmapped_columns_are_ignored() {
    let session = Session::default();
    let cursor = MemoryCursor::new(
        person_columns(),
        vec![vec![
            SqlValue::Int(7),
            SqlValue::Text("Grace".into()),
            SqlValue::Text("ignored".into()),
        ]],
    );
    let people: Vec<Person> = session
        .extractor::<Person, _>(cursor)
        .unwrap()
        .extract_all()
        .unwrap();
    assert_eq!(
        people,
        vec![Person {
            id: 7,
            name: "Grace".into()
        }]
    );
}

#[test]
fn test_field_without_column_keeps_default() {
    let session = Session::default();
    let cursor = MemoryCursor::new(
        vec![Column::new("ID", SqlType::Integer)],
        vec![vec![SqlValue::Int(1)]],
    );
    let person = session
        .extractor::<Person, _>(cursor)
        .unwrap()
        .extract_one()
        .unwrap()
        .unwrap();
    assert_eq!(person.id, 1);
    assert_eq!(person.name, "");
}

#[test]
fn test_k_rows_then_sticky_empty() {
    let session = Session::default();
    let rows = (0..4)
        .map(|i| vec![SqlValue::Int(i), SqlValue::Text(format!("p{}", i)), SqlValue::Null])
        .collect();
    let cursor = MemoryCursor::new(person_columns(), rows);
    let probe = cursor.probe();
    let mut extractor = session.extractor::<Person, _>(cursor).unwrap();

    for i in 0..4 {
        assert_eq!(extractor.extract_one().unwrap().unwrap().id, i);
    }
    assert!(extractor.extract_one().unwrap().is_none());
    let advances = probe.advances();
    assert!(extractor.extract(3).unwrap().is_empty());
    assert!(extractor.next().is_none());
    assert_eq!(probe.advances(), advances);
}

#[test]
fn test_plan_built_once_for_many_rows() {
    let session = Session::default();
    for _ in 0..3 {
        let rows = (0..100)
            .map(|i| vec![SqlValue::Int(i), SqlValue::Text("n".into()), SqlValue::Null])
            .collect();
        let cursor = MemoryCursor::new(person_columns(), rows);
        let people: Vec<Person> = session
            .extractor::<Person, _>(cursor)
            .unwrap()
            .collect::<nocturne::Result<_>>()
            .unwrap();
        assert_eq!(people.len(), 100);
    }
    assert_eq!(session.materializer().plans_built(), 1);
}

#[test]
fn test_plan_built_once_under_concurrency() {
    let materializer = Arc::new(Materializer::new(
        Arc::new(ConverterRegistry::standard()),
        ColumnNaming::new(NameMapper::SnakeCase),
    ));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let materializer = Arc::clone(&materializer);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..50 {
                    materializer.plan::<Person>(&person_columns()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(materializer.plans_built(), 1);
    assert_eq!(materializer.cached_plans(), 1);
}

#[test]
fn test_immutable_shape_in_declared_order() {
    let session = Session::default();
    let cursor = MemoryCursor::new(
        vec![Column::new("X", SqlType::Integer), Column::new("Y", SqlType::BigInt)],
        vec![vec![SqlValue::Int(1), SqlValue::BigInt(2)]],
    );
    let point = session
        .extractor::<ImmutablePoint, _>(cursor)
        .unwrap()
        .extract_one()
        .unwrap();
    assert_eq!(point, Some(ImmutablePoint { x: 1, y: 2 }));
}

#[test]
fn test_immutable_shape_rejects_partial_or_reordered_columns() {
    let session = Session::default();
    let reordered = MemoryCursor::new(
        vec![Column::new("Y", SqlType::Integer), Column::new("X", SqlType::Integer)],
        vec![],
    );
    let err = session
        .extractor::<ImmutablePoint, _>(reordered)
        .err()
        .unwrap();
    assert!(matches!(err, Error::ShapeMismatch { shape: "Point", .. }), "{}", err);

    let partial = MemoryCursor::new(vec![Column::new("X", SqlType::Integer)], vec![]);
    assert!(matches!(
        session.extractor::<ImmutablePoint, _>(partial),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_string_factory_fields_and_overrides() {
    let session = Session::default();
    let cursor = MemoryCursor::new(
        vec![
            Column::new("PRODUCT_CODE", SqlType::Varchar),
            Column::new("RELEASED", SqlType::Date),
            Column::new("PRICE", SqlType::Numeric),
            Column::new("NOTE", SqlType::Varchar),
        ],
        vec![
            vec![
                SqlValue::Text("SKU-1".into()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
                SqlValue::Decimal("9.5".parse().unwrap()),
                SqlValue::Text("not read".into()),
            ],
            vec![SqlValue::Null, SqlValue::Null, SqlValue::Double(1.0), SqlValue::Null],
        ],
    );
    let products: Vec<Product> = session
        .extractor::<Product, _>(cursor)
        .unwrap()
        .extract_all()
        .unwrap();
    assert_eq!(
        products,
        vec![
            Product {
                sku: Some(Sku("SKU-1".into())),
                released: NaiveDate::from_ymd_opt(2024, 2, 29),
                price: 9.5,
                note: String::new(),
            },
            Product {
                sku: None,
                released: None,
                price: 1.0,
                note: String::new(),
            },
        ]
    );
}

#[test]
fn test_factory_failure_names_the_column() {
    let session = Session::default();
    let cursor = MemoryCursor::new(
        vec![Column::new("PRODUCT_CODE", SqlType::Varchar)],
        vec![vec![SqlValue::Text("XYZ".into())]],
    );
    let err = session
        .extractor::<Product, _>(cursor)
        .unwrap()
        .extract_one()
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("PRODUCT_CODE"), "{}", message);
    assert!(message.contains("not a SKU: XYZ"), "{}", message);
}

#[test]
fn test_null_into_required_field_fails() {
    let session = Session::default();
    let cursor = MemoryCursor::new(person_columns(), vec![vec![SqlValue::Null; 3]]);
    let err = session
        .extractor::<Person, _>(cursor)
        .unwrap()
        .extract_one()
        .unwrap_err();
    assert!(matches!(err, Error::Conversion { .. }), "{}", err);
}

#[test]
fn test_unsupported_column_type_fails_at_plan_time() {
    let session = Session::default();
    let cursor = MemoryCursor::new(vec![Column::new("ID", SqlType::Date)], vec![]);
    match session.extractor::<Person, _>(cursor) {
        Err(err) => assert_eq!(err.to_string(), "cannot convert DATE to i32"),
        Ok(_) => panic!("plan should not build"),
    }
}

#[test]
fn test_overrides_from_config() {
    let config: SessionConfig = serde_json::from_str(
        r#"{ "name_mapper": "lowercase", "column_overrides": { "PERSON_NAME": "name" } }"#,
    )
    .unwrap();
    let session = Session::new(config);
    let columns = vec![
        Column::new("ID", SqlType::Integer),
        Column::new("PERSON_NAME", SqlType::Varchar),
    ];
    let plan = session.materializer().plan::<Person>(&columns).unwrap();
    let row = Row::new(
        columns.into(),
        vec![SqlValue::Int(3), SqlValue::Text("Lin".into())],
    );
    assert_eq!(
        plan.materialize(&row).unwrap(),
        Person {
            id: 3,
            name: "Lin".into()
        }
    );
}

#[test]
fn test_descriptor_lists_fields_in_order() {
    let descriptor = Product::descriptor();
    let names: Vec<_> = descriptor.fields().iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["sku", "released", "price"]);
    assert_eq!(descriptor.field("sku").unwrap().column(), Some("PRODUCT_CODE"));
    assert!(ImmutablePoint::descriptor().is_immutable());
}
