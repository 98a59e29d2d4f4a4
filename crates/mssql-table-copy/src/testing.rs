//! In-memory session answering catalog queries and paging windows.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::{qualify, ResultSet, Row, SqlNullType, SqlValue, Statement};
use crate::error::{CopyError, Result};
use crate::indexes::DROPPABLE_INDEXES_QUERY;
use crate::schema::reflect::{
    COLUMNS_QUERY, INDEXES_QUERY, LIST_OBJECTS_QUERY, OBJECT_EXISTS_QUERY, PRIMARY_KEY_QUERY,
    VIEW_DEFINITION_QUERY,
};
use crate::schema::{
    ColumnDescriptor, IndexDescriptor, KeyStorage, PrimaryKeyDescriptor, SizeFacet,
    TableDescriptor,
};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Query,
    Execute,
}

/// Statement log shared between a fake and the test that owns it.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<(CallKind, Statement)>>>);

impl CallLog {
    fn push(&self, kind: CallKind, stmt: &Statement) {
        self.0.lock().unwrap().push((kind, stmt.clone()));
    }

    pub(crate) fn all(&self) -> Vec<(CallKind, Statement)> {
        self.0.lock().unwrap().clone()
    }

    /// SQL text of every `execute` call, in order.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|(k, _)| *k == CallKind::Execute)
            .map(|(_, s)| s.sql)
            .collect()
    }

    /// Every query whose text contains `needle`.
    pub(crate) fn queries_containing(&self, needle: &str) -> Vec<Statement> {
        self.all()
            .into_iter()
            .filter(|(k, s)| *k == CallKind::Query && s.sql.contains(needle))
            .map(|(_, s)| s)
            .collect()
    }
}

struct FakeObject {
    table: TableDescriptor,
    rows: usize,
    view_definition: Option<String>,
}

pub(crate) struct FakeServer {
    name: String,
    objects: Vec<FakeObject>,
    failures: Vec<String>,
    canned: Vec<(String, ResultSet)>,
    log: CallLog,
}

impl FakeServer {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Vec::new(),
            failures: Vec::new(),
            canned: Vec::new(),
            log: CallLog::default(),
        }
    }

    pub(crate) fn with_table(mut self, table: TableDescriptor, rows: usize) -> Self {
        self.objects.push(FakeObject {
            table,
            rows,
            view_definition: None,
        });
        self
    }

    pub(crate) fn with_view(mut self, schema: &str, name: &str, definition: &str) -> Self {
        let mut table = sample_table(schema, name);
        table.primary_key = None;
        table.indexes.clear();
        self.objects.push(FakeObject {
            table,
            rows: 0,
            view_definition: Some(definition.to_string()),
        });
        self
    }

    /// Fail any statement whose text contains `needle`.
    pub(crate) fn failing_on(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    /// Answer any query containing `needle` with `result`.
    pub(crate) fn responding(mut self, needle: &str, result: ResultSet) -> Self {
        self.canned.push((needle.to_string(), result));
        self
    }

    pub(crate) fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn check_failure(&self, stmt: &Statement) -> Result<()> {
        match self.failures.iter().find(|f| stmt.sql.contains(f.as_str())) {
            Some(f) => Err(CopyError::execution(
                format!("{} statement", self.name),
                format!("injected failure on '{}'", f),
            )),
            None => Ok(()),
        }
    }

    fn find(&self, schema: &SqlValue, name: &SqlValue) -> Option<&FakeObject> {
        let (schema, name) = (schema.as_str()?, name.as_str()?);
        self.objects
            .iter()
            .find(|o| o.table.schema == schema && o.table.name == name)
    }

    fn find_in_sql(&self, sql: &str) -> Option<&FakeObject> {
        self.objects.iter().find(|o| {
            qualify(&o.table.schema, &o.table.name)
                .map(|q| sql.contains(&q))
                .unwrap_or(false)
        })
    }

    fn answer(&self, stmt: &Statement) -> ResultSet {
        let p = &stmt.params;
        let sql = stmt.sql.as_str();

        if sql == COLUMNS_QUERY {
            return self
                .find(&p[0], &p[1])
                .map(|o| rows(o.table.columns.iter().map(column_row).collect()))
                .unwrap_or_default();
        }
        if sql == PRIMARY_KEY_QUERY {
            let pk = self
                .find(&p[0], &p[1])
                .and_then(|o| o.table.primary_key.clone());
            return match pk {
                Some(pk) => rows(
                    pk.columns
                        .iter()
                        .map(|c| {
                            vec![
                                pk.name.as_str().into(),
                                c.as_str().into(),
                                pk.storage.as_sql().into(),
                            ]
                        })
                        .collect(),
                ),
                None => ResultSet::default(),
            };
        }
        if sql == INDEXES_QUERY {
            return self
                .find(&p[0], &p[1])
                .map(|o| {
                    rows(
                        o.table
                            .indexes
                            .iter()
                            .flat_map(|idx| {
                                idx.columns.iter().map(move |c| {
                                    vec![
                                        idx.name.as_str().into(),
                                        SqlValue::I32(i32::from(idx.is_unique)),
                                        c.as_str().into(),
                                    ]
                                })
                            })
                            .collect(),
                    )
                })
                .unwrap_or_default();
        }
        if sql == DROPPABLE_INDEXES_QUERY {
            let mut names: Vec<String> = self
                .find(&p[0], &p[1])
                .map(|o| o.table.indexes.iter().map(|i| i.name.clone()).collect())
                .unwrap_or_default();
            names.sort();
            return rows(names.into_iter().map(|n| vec![n.into()]).collect());
        }
        if sql == OBJECT_EXISTS_QUERY {
            let found = self.find(&p[0], &p[1]).filter(|o| {
                let kind = if o.view_definition.is_some() {
                    "VIEW"
                } else {
                    "BASE TABLE"
                };
                p[2].as_str() == Some(kind)
            });
            return rows(vec![vec![SqlValue::I32(i32::from(found.is_some()))]]);
        }
        if sql == LIST_OBJECTS_QUERY {
            let want_views = p[1].as_str() == Some("VIEW");
            let mut names: Vec<&str> = self
                .objects
                .iter()
                .filter(|o| p[0].as_str() == Some(o.table.schema.as_str()))
                .filter(|o| o.view_definition.is_some() == want_views)
                .map(|o| o.table.name.as_str())
                .collect();
            names.sort();
            return rows(names.into_iter().map(|n| vec![n.into()]).collect());
        }
        if sql == VIEW_DEFINITION_QUERY {
            return self
                .find(&p[0], &p[1])
                .and_then(|o| o.view_definition.clone())
                .map(|d| rows(vec![vec![d.into()]]))
                .unwrap_or_default();
        }
        if let Some((_, canned)) = self.canned.iter().find(|(n, _)| sql.contains(n.as_str())) {
            return canned.clone();
        }
        if sql.starts_with("SELECT COUNT_BIG(*)") {
            let count = self.find_in_sql(sql).map(|o| o.rows).unwrap_or(0);
            return rows(vec![vec![SqlValue::I64(count as i64)]]);
        }
        if sql.contains("FETCH NEXT") || sql.contains("__copy_rank") {
            let Some(object) = self.find_in_sql(sql) else {
                return ResultSet::default();
            };
            let first = p[0].as_i64().unwrap_or(0).max(0) as usize;
            let second = p[1].as_i64().unwrap_or(0).max(0) as usize;
            // Keyset binds (lo, hi]; offset binds (offset, count).
            let end = if sql.contains("__copy_rank") {
                second
            } else {
                first + second
            };
            let end = end.min(object.rows);
            let data = (first.min(end)..end)
                .map(|i| fake_row(&object.table, i))
                .collect();
            return ResultSet {
                columns: object.table.column_names(),
                rows: data,
            };
        }
        ResultSet::default()
    }
}

fn rows(rows: Vec<Row>) -> ResultSet {
    ResultSet {
        columns: Vec::new(),
        rows,
    }
}

fn opt_i32(v: Option<i64>) -> SqlValue {
    v.map(|n| SqlValue::I32(n as i32))
        .unwrap_or(SqlValue::Null(SqlNullType::I32))
}

fn column_row(col: &ColumnDescriptor) -> Row {
    let (length, precision, scale, fractional) = match col.facet {
        SizeFacet::None => (None, None, None, None),
        SizeFacet::Length(l) => (l.map(i64::from), None, None, None),
        SizeFacet::Exact { precision, scale } => {
            (None, precision.map(i64::from), scale.map(i64::from), None)
        }
        SizeFacet::Fractional(f) => (None, None, None, f.map(i64::from)),
    };
    vec![
        col.name.as_str().into(),
        col.data_type.as_str().into(),
        SqlValue::I32(i32::from(col.nullable)),
        col.default.clone().into(),
        opt_i32(length),
        opt_i32(precision),
        opt_i32(scale),
        opt_i32(fractional),
        SqlValue::I32(i32::from(col.is_identity)),
    ]
}

/// Deterministic row `i` (0-based) of a fake table.
pub(crate) fn fake_row(table: &TableDescriptor, i: usize) -> Row {
    table
        .columns
        .iter()
        .map(|c| match c.data_type.as_str() {
            "int" => SqlValue::I32(i as i32 + 1),
            "bigint" => SqlValue::I64(i as i64 + 1),
            "decimal" | "numeric" => SqlValue::Decimal(Decimal::new(i as i64 * 10 + 5, 1)),
            "nvarchar" | "varchar" => SqlValue::String(format!("{}-{}", c.name, i + 1)),
            _ => SqlValue::Null(SqlNullType::String),
        })
        .collect()
}

#[async_trait]
impl Session for FakeServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&mut self, stmt: &Statement) -> Result<ResultSet> {
        self.log.push(CallKind::Query, stmt);
        self.check_failure(stmt)?;
        Ok(self.answer(stmt))
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        self.log.push(CallKind::Execute, stmt);
        self.check_failure(stmt)?;
        Ok(0)
    }
}

pub(crate) fn column(
    name: &str,
    data_type: &str,
    nullable: bool,
    facet: SizeFacet,
) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable,
        default: None,
        facet,
        is_identity: false,
    }
}

/// `id int NOT NULL` (clustered PK), `name nvarchar(50)`,
/// `amount decimal(10, 2) DEFAULT ((0))`, index on `name`.
pub(crate) fn sample_table(schema: &str, name: &str) -> TableDescriptor {
    let mut amount = column(
        "amount",
        "decimal",
        true,
        SizeFacet::Exact {
            precision: Some(10),
            scale: Some(2),
        },
    );
    amount.default = Some("((0))".to_string());
    TableDescriptor {
        schema: schema.to_string(),
        name: name.to_string(),
        columns: vec![
            column("id", "int", false, SizeFacet::None),
            column("name", "nvarchar", true, SizeFacet::Length(Some(50))),
            amount,
        ],
        primary_key: Some(PrimaryKeyDescriptor {
            name: format!("PK_{}", name),
            columns: vec!["id".to_string()],
            storage: KeyStorage::Clustered,
        }),
        indexes: vec![IndexDescriptor {
            name: format!("IX_{}_name", name),
            is_unique: false,
            columns: vec!["name".to_string()],
        }],
    }
}
