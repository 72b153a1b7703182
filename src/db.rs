//! Thin execution wrapper around a SQL driver.
//!
//! The driver itself is an external collaborator behind [`SqlExecutor`].
//! [`Database`] pairs it with the adapter of its driver, rebinds
//! placeholders, times every statement and turns driver failures into
//! [`ModelError::Execution`] carrying the query and its arguments.

use crate::adapter::{DbAdapter, get_adapter};
use crate::config::Config;
use crate::core::{DriverError, ModelError, Result, Row, Value};
use crate::query::SqlStatement;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Level, debug_span, event};

pub trait SqlExecutor: Send + Sync {
    /// Run a statement returning no rows; returns the affected row count.
    fn execute(&self, sql: &str, args: &[Value]) -> std::result::Result<u64, DriverError>;

    fn query(&self, sql: &str, args: &[Value]) -> std::result::Result<Vec<Row>, DriverError>;
}

pub struct Database {
    driver: String,
    adapter: Arc<dyn DbAdapter>,
    executor: Box<dyn SqlExecutor>,
    debug_sql: bool,
}

impl Database {
    pub fn new(driver: &str, executor: impl SqlExecutor + 'static) -> Result<Self> {
        let adapter = get_adapter(driver)?;
        log::info!("Connected to database (driver {})", driver);
        Ok(Self {
            driver: driver.to_string(),
            adapter,
            executor: Box::new(executor),
            debug_sql: false,
        })
    }

    pub fn from_config(config: &Config, executor: impl SqlExecutor + 'static) -> Result<Self> {
        config.database.validate()?;
        log::info!("Opening {}", config.database.to_url());
        let mut db = Self::new(&config.database.driver, executor)?;
        db.debug_sql = config.debug_sql;
        Ok(db)
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn adapter(&self) -> &dyn DbAdapter {
        self.adapter.as_ref()
    }

    pub fn execute(&self, sql: &str, args: &[Value]) -> Result<u64> {
        self.instrumented(sql, args, |query| self.executor.execute(query, args))
    }

    pub fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.instrumented(sql, args, |query| self.executor.query(query, args))
    }

    /// Query expecting exactly one row.
    pub fn get(&self, sql: &str, args: &[Value]) -> Result<Row> {
        let mut rows = self.query(sql, args)?;
        if rows.len() != 1 {
            return Err(ModelError::UnexpectedRowCount {
                query: sql.to_string(),
                rows: rows.len(),
            });
        }
        Ok(rows.remove(0))
    }

    pub fn run(&self, stmt: &SqlStatement) -> Result<u64> {
        self.execute(&stmt.sql, &stmt.args)
    }

    pub fn fetch(&self, stmt: &SqlStatement) -> Result<Vec<Row>> {
        self.query(&stmt.sql, &stmt.args)
    }

    pub fn fetch_one(&self, stmt: &SqlStatement) -> Result<Row> {
        self.get(&stmt.sql, &stmt.args)
    }

    fn instrumented<T>(
        &self,
        sql: &str,
        args: &[Value],
        run: impl FnOnce(&str) -> std::result::Result<T, DriverError>,
    ) -> Result<T> {
        let query = self.adapter.rebind(sql);
        if self.debug_sql {
            log::info!("{} [{}]", query, format_args_list(args));
        }
        let span = debug_span!("db.statement", driver = %self.driver);
        let _enter = span.enter();

        let started = Instant::now();
        let res = run(&query);
        let elapsed = started.elapsed();

        match res {
            Ok(value) => {
                event!(
                    Level::DEBUG,
                    query = %query,
                    args = args.len(),
                    duration_us = elapsed.as_micros() as u64,
                    "Query executed"
                );
                Ok(value)
            }
            Err(source) => {
                event!(Level::ERROR, query = %query, error = %source, "Query failed");
                Err(ModelError::Execution {
                    query,
                    args: format_args_list(args),
                    source,
                })
            }
        }
    }
}

fn format_args_list(args: &[Value]) -> String {
    args.iter()
        .map(|a| match a {
            Value::Text(s) => format!("'{}'", s),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
