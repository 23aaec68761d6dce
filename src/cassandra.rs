// Cassandra / ScyllaDB adapter built on the scylla driver
//
// The session, keyspace, tables and all prepared statements are set up once,
// before any worker starts. Workers only ever see a fully initialised store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use scylla::batch::{Batch, BatchType};
use scylla::frame::value::CqlTimestamp;
use scylla::load_balancing::DefaultPolicy;
use scylla::prepared_statement::PreparedStatement;
use scylla::statement::Consistency;
use scylla::transport::{Compression, ExecutionProfile};
use scylla::{Session, SessionBuilder};
use tracing::{debug, info};

use crate::store::StoreClient;
use crate::workload::{BatchWriteRequest, ReadQuery, TableRow, NO_TABLES};

const DEFAULT_CQL_PORT: u16 = 9042;

/// Everything needed to reach and prepare the cluster
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub contact_point: String,
    pub username: String,
    pub password: String,
    pub keyspace: String,
    pub replication_factor: u32,
}

pub struct CassandraStore {
    session: Session,
    inserts: Vec<PreparedStatement>,
    selects: Vec<PreparedStatement>,
}

/// Bound values for one INSERT: id0..id9, name, csharpDate
type InsertValues<'a> = (
    i32, i32, i32, i32, i32, i32, i32, i32, i32, i32,
    &'a str,
    CqlTimestamp,
);

impl CassandraStore {
    /// Connect, recreate the schema and prepare every statement
    pub async fn open(opts: &ConnectOptions) -> Result<Self> {
        info!("Connecting to Cassandra...");
        let session = connect(opts).await?;
        info!("Connected");

        setup_schema(&session, &opts.keyspace, opts.replication_factor).await?;

        info!("Creating prepared statements...");
        let store = Self::prepare(session).await?;
        info!("Created");

        Ok(store)
    }

    async fn prepare(session: Session) -> Result<Self> {
        let mut inserts = Vec::with_capacity(NO_TABLES);
        let mut selects = Vec::with_capacity(NO_TABLES);

        for table in 0..NO_TABLES {
            let mut insert = session
                .prepare(insert_cql(table))
                .await
                .with_context(|| format!("Failed to prepare insert for test{}", table))?;
            insert.set_consistency(Consistency::LocalQuorum);
            inserts.push(insert);

            let mut select = session
                .prepare(select_cql(table))
                .await
                .with_context(|| format!("Failed to prepare select for test{}", table))?;
            select.set_consistency(Consistency::LocalQuorum);
            selects.push(select);

            debug!("Prepared statements for test{}", table);
        }

        Ok(Self {
            session,
            inserts,
            selects,
        })
    }
}

#[async_trait]
impl StoreClient for CassandraStore {
    async fn write_batch(&self, request: &BatchWriteRequest) -> Result<()> {
        let mut batch = Batch::new(BatchType::Logged);
        batch.set_consistency(Consistency::LocalQuorum);

        let mut values: Vec<InsertValues<'_>> = Vec::with_capacity(request.writes.len());
        for write in &request.writes {
            let insert = self
                .inserts
                .get(write.table)
                .with_context(|| format!("No insert statement for test{}", write.table))?;
            batch.append_statement(insert.clone());
            values.push(insert_values(&write.row));
        }

        self.session
            .batch(&batch, values)
            .await
            .with_context(|| format!("Batch write failed for index {}", request.index))?;
        Ok(())
    }

    async fn read(&self, query: &ReadQuery) -> Result<bool> {
        let select = self
            .selects
            .get(query.table)
            .with_context(|| format!("No select statement for test{}", query.table))?;

        let result = self
            .session
            .execute_unpaged(select, (query.key,))
            .await
            .with_context(|| format!("Select failed on test{} for key {}", query.table, query.key))?;

        Ok(result.rows.as_ref().map_or(false, |rows| !rows.is_empty()))
    }
}

async fn connect(opts: &ConnectOptions) -> Result<Session> {
    let policy = DefaultPolicy::builder().token_aware(true).build();
    let profile = ExecutionProfile::builder()
        .load_balancing_policy(policy)
        .consistency(Consistency::LocalQuorum)
        .build();

    SessionBuilder::new()
        .known_node(with_default_port(&opts.contact_point))
        .user(&opts.username, &opts.password)
        .compression(Some(Compression::Snappy))
        .default_execution_profile_handle(profile.into_handle())
        .build()
        .await
        .with_context(|| format!("Failed to connect to {}", opts.contact_point))
}

async fn setup_schema(session: &Session, keyspace: &str, replication_factor: u32) -> Result<()> {
    session
        .query_unpaged(format!("DROP KEYSPACE IF EXISTS {}", keyspace), ())
        .await
        .with_context(|| format!("Failed to drop keyspace {}", keyspace))?;
    session
        .query_unpaged(create_keyspace_cql(keyspace, replication_factor), ())
        .await
        .with_context(|| format!("Failed to create keyspace {}", keyspace))?;
    session
        .use_keyspace(keyspace, false)
        .await
        .with_context(|| format!("Failed to use keyspace {}", keyspace))?;

    for table in 0..NO_TABLES {
        info!("Creating table test{}...", table);
        session
            .query_unpaged(create_table_cql(table), ())
            .await
            .with_context(|| format!("Failed to create table test{}", table))?;
        info!("Created");
    }

    Ok(())
}

fn insert_values(row: &TableRow) -> InsertValues<'_> {
    let [id0, id1, id2, id3, id4, id5, id6, id7, id8, id9] = row.ids;
    (
        id0, id1, id2, id3, id4, id5, id6, id7, id8, id9,
        row.payload.as_str(),
        CqlTimestamp(row.written_at.timestamp_millis()),
    )
}

fn with_default_port(contact_point: &str) -> String {
    if contact_point.contains(':') {
        contact_point.to_string()
    } else {
        format!("{}:{}", contact_point, DEFAULT_CQL_PORT)
    }
}

fn create_keyspace_cql(keyspace: &str, replication_factor: u32) -> String {
    format!(
        "CREATE KEYSPACE {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    )
}

fn create_table_cql(table: usize) -> String {
    format!(
        "CREATE TABLE test{table} (
    id0          int,
    id1          int,
    id2          int,
    id3          int,
    id4          int,
    id5          int,
    id6          int,
    id7          int,
    id8          int,
    id9          int,
    name         text,
    csharpDate   timestamp,
    cqlDate      timestamp,
    tuuid        timeuuid,
    primary key (id{table})
)"
    )
}

fn insert_cql(table: usize) -> String {
    format!(
        "INSERT INTO test{} (id0, id1, id2, id3, id4, id5, id6, id7, id8, id9, name, csharpDate, cqlDate, tuuid) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, toUnixTimestamp(now()), now())",
        table
    )
}

fn select_cql(table: usize) -> String {
    format!("SELECT * FROM test{} WHERE id{} = ?", table, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::WorkloadGenerator;

    #[test]
    fn default_port_is_appended() {
        assert_eq!(with_default_port("10.0.0.1"), "10.0.0.1:9042");
        assert_eq!(with_default_port("10.0.0.1:19042"), "10.0.0.1:19042");
    }

    #[test]
    fn select_uses_table_key_column() {
        assert_eq!(select_cql(3), "SELECT * FROM test3 WHERE id3 = ?");
    }

    #[test]
    fn insert_binds_twelve_markers() {
        let cql = insert_cql(0);
        assert!(cql.starts_with("INSERT INTO test0 "));
        assert_eq!(cql.matches('?').count(), 12);
    }

    #[test]
    fn table_primary_key_follows_table_number() {
        let cql = create_table_cql(4);
        assert!(cql.starts_with("CREATE TABLE test4 ("));
        assert!(cql.contains("primary key (id4)"));
    }

    #[test]
    fn keyspace_replication() {
        assert_eq!(
            create_keyspace_cql("test1", 3),
            "CREATE KEYSPACE test1 WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 3}"
        );
    }

    #[test]
    fn insert_values_follow_row() {
        let unit = WorkloadGenerator::new(1).generate(100);
        let row = &unit.rows[0];
        let values = insert_values(row);
        assert_eq!(values.0, 100);
        assert_eq!(values.9, 109);
        assert_eq!(values.10, row.payload);
        assert_eq!(values.11, CqlTimestamp(row.written_at.timestamp_millis()));
    }
}
