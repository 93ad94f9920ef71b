//! A minimal reference `SqlEngine` covering exactly the seed scenarios
//! in the testable-properties section of the specification this crate
//! implements: `CREATE TABLE`, `INSERT`, `SELECT ... ORDER BY`,
//! `SELECT count(*)`, `DELETE`. The real parser/planner/VM is an
//! external collaborator and out of scope for this crate — this engine
//! exists only to exercise the host/transaction/coordinator plumbing
//! end to end.
//!
//! State is persisted through the `PageIo` boundary like a real engine
//! would: page 0 carries the SQLite magic header plus a payload length,
//! and the row set is serialized across as many pages as it needs.

use std::time::Duration;

use driftdb::common::config::SQLITE_MAGIC_HEADER;
use driftdb::common::{Error, Result};
use driftdb::host::{PageIo, PreparedStatement, QueryResult, SqlEngine, SqlEngineFactory, StreamCursor, Value};

const HEADER_BYTES: usize = 28;

#[derive(Clone)]
struct Row {
    id: i64,
    name: String,
}

fn read_rows(io: &mut dyn PageIo) -> Result<Vec<Row>> {
    let page0 = io.read_page(0)?;
    if page0.len() < HEADER_BYTES || &page0[0..16] != SQLITE_MAGIC_HEADER.as_slice() {
        return Ok(Vec::new());
    }
    let payload_len = u32::from_be_bytes([page0[24], page0[25], page0[26], page0[27]]) as usize;
    let page_size = io.page_size();
    let pages_needed = if payload_len == 0 {
        1
    } else {
        1 + (payload_len.saturating_sub(page_size - HEADER_BYTES)).div_ceil(page_size)
    };

    let mut payload = Vec::with_capacity(payload_len);
    payload.extend_from_slice(&page0[HEADER_BYTES..page_size]);
    for n in 1..pages_needed as u32 {
        payload.extend_from_slice(&io.read_page(n)?);
    }
    payload.truncate(payload_len);

    let mut rows = Vec::new();
    let mut cursor = 0usize;
    if payload.len() >= 4 {
        let count = u32::from_be_bytes(payload[0..4].try_into().unwrap()) as usize;
        cursor += 4;
        for _ in 0..count {
            let id = i64::from_be_bytes(payload[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
            let name_len = u32::from_be_bytes(payload[cursor..cursor + 4].try_into().unwrap()) as usize;
            cursor += 4;
            let name = String::from_utf8(payload[cursor..cursor + name_len].to_vec())
                .map_err(|e| Error::CorruptPayload(e.to_string()))?;
            cursor += name_len;
            rows.push(Row { id, name });
        }
    }
    Ok(rows)
}

fn write_rows(io: &mut dyn PageIo, rows: &[Row]) -> Result<()> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(rows.len() as u32).to_be_bytes());
    for row in rows {
        payload.extend_from_slice(&row.id.to_be_bytes());
        payload.extend_from_slice(&(row.name.len() as u32).to_be_bytes());
        payload.extend_from_slice(row.name.as_bytes());
    }

    let page_size = io.page_size();
    let mut page0 = vec![0u8; page_size];
    page0[0..16].copy_from_slice(SQLITE_MAGIC_HEADER.as_slice());
    page0[16..18].copy_from_slice(&(page_size as u16).to_be_bytes());
    page0[24..28].copy_from_slice(&(payload.len() as u32).to_be_bytes());

    let first_chunk_len = (page_size - HEADER_BYTES).min(payload.len());
    page0[HEADER_BYTES..HEADER_BYTES + first_chunk_len].copy_from_slice(&payload[0..first_chunk_len]);
    io.write_page(0, &page0)?;

    let mut offset = first_chunk_len;
    let mut n = 1u32;
    while offset < payload.len() {
        let end = (offset + page_size).min(payload.len());
        let mut page = vec![0u8; page_size];
        page[0..end - offset].copy_from_slice(&payload[offset..end]);
        io.write_page(n, &page)?;
        offset = end;
        n += 1;
    }
    io.truncate(n)?;
    io.sync()
}

fn apply(io: &mut dyn PageIo, sql: &str) -> Result<QueryResult> {
    let sql = sql.trim();
    let mut rows = read_rows(io)?;

    if sql.to_ascii_uppercase().starts_with("CREATE TABLE") {
        if rows.is_empty() {
            write_rows(io, &rows)?;
        }
        return Ok(QueryResult::empty());
    }

    if let Some(rest) = strip_prefix_ci(sql, "INSERT INTO items VALUES (") {
        let body = rest.trim_end_matches(')').trim_end_matches(';');
        let mut parts = body.splitn(2, ',');
        let id: i64 = parts
            .next()
            .ok_or_else(|| Error::InvalidSql { message: "missing id".to_string(), position: None })?
            .trim()
            .parse()
            .map_err(|_| Error::InvalidSql { message: "bad id".to_string(), position: None })?;
        let name = parts
            .next()
            .ok_or_else(|| Error::InvalidSql { message: "missing name".to_string(), position: None })?
            .trim()
            .trim_matches('\'')
            .to_string();
        rows.push(Row { id, name });
        write_rows(io, &rows)?;
        return Ok(QueryResult {
            columns: vec![],
            rows: vec![],
            rows_affected: 1,
            last_insert_id: Some(id),
            elapsed: Duration::from_millis(0),
        });
    }

    if sql.eq_ignore_ascii_case("SELECT name FROM items ORDER BY id") {
        let mut sorted = rows.clone();
        sorted.sort_by_key(|r| r.id);
        return Ok(QueryResult {
            columns: vec!["name".to_string()],
            rows: sorted.into_iter().map(|r| vec![Value::Text(r.name)]).collect(),
            rows_affected: 0,
            last_insert_id: None,
            elapsed: Duration::from_millis(0),
        });
    }

    if sql.eq_ignore_ascii_case("SELECT * FROM items ORDER BY id") {
        let mut sorted = rows.clone();
        sorted.sort_by_key(|r| r.id);
        return Ok(QueryResult {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: sorted
                .into_iter()
                .map(|r| vec![Value::Integer(r.id), Value::Text(r.name)])
                .collect(),
            rows_affected: 0,
            last_insert_id: None,
            elapsed: Duration::from_millis(0),
        });
    }

    if sql.eq_ignore_ascii_case("SELECT count(*) FROM items") {
        return Ok(QueryResult {
            columns: vec!["count(*)".to_string()],
            rows: vec![vec![Value::Integer(rows.len() as i64)]],
            rows_affected: 0,
            last_insert_id: None,
            elapsed: Duration::from_millis(0),
        });
    }

    if let Some(rest) = strip_prefix_ci(sql, "DELETE FROM items WHERE id=") {
        let id: i64 = rest
            .trim_end_matches(';')
            .trim()
            .parse()
            .map_err(|_| Error::InvalidSql { message: "bad id".to_string(), position: None })?;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        let affected = before - rows.len();
        write_rows(io, &rows)?;
        return Ok(QueryResult {
            columns: vec![],
            rows: vec![],
            rows_affected: affected as u64,
            last_insert_id: None,
            elapsed: Duration::from_millis(0),
        });
    }

    Err(Error::InvalidSql { message: format!("unsupported statement: {sql}"), position: None })
}

fn strip_prefix_ci<'a>(sql: &'a str, prefix: &str) -> Option<&'a str> {
    if sql.len() >= prefix.len() && sql[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&sql[prefix.len()..])
    } else {
        None
    }
}

#[derive(Default)]
pub struct SeedEngine;

impl SqlEngine for SeedEngine {
    fn execute(&mut self, io: &mut dyn PageIo, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        apply(io, sql)
    }

    fn prepare(&mut self, _io: &mut dyn PageIo, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        Ok(Box::new(SeedStatement { sql: sql.to_string() }))
    }
}

struct SeedStatement {
    sql: String,
}

impl PreparedStatement for SeedStatement {
    fn execute(&mut self, io: &mut dyn PageIo, _params: &[Value]) -> Result<QueryResult> {
        apply(io, &self.sql)
    }

    fn prepare_stream(&mut self, io: &mut dyn PageIo, _params: &[Value]) -> Result<Box<dyn StreamCursor>> {
        let result = apply(io, &self.sql)?;
        Ok(Box::new(SeedCursor { rows: result.rows, offset: 0 }))
    }
}

struct SeedCursor {
    rows: Vec<Vec<Value>>,
    offset: usize,
}

impl StreamCursor for SeedCursor {
    fn fetch_next(&mut self, _io: &mut dyn PageIo, batch_size: usize) -> Result<Vec<Vec<Value>>> {
        let end = (self.offset + batch_size).min(self.rows.len());
        let batch = self.rows[self.offset..end].to_vec();
        self.offset = end;
        Ok(batch)
    }
}

pub struct SeedEngineFactory;

impl SqlEngineFactory for SeedEngineFactory {
    fn create(&self) -> Box<dyn SqlEngine> {
        Box::new(SeedEngine)
    }
}
