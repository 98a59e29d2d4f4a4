//! Tiberius-backed session.

use std::time::Instant;

use async_trait::async_trait;
use tiberius::{AuthMethod as TiberiusAuthMethod, Client, Config, EncryptionLevel, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use super::convert::{column_data_to_value, sql_value_to_sql_param};
use super::Session;
use crate::config::{AuthMethod, ConnectionConfig};
use crate::core::{ResultSet, Statement};
use crate::error::{CopyError, Result};

/// Maximum TDS packet size (32767 bytes, ~32KB).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Environment variable consulted for `aad_token` when no token is configured.
pub const ACCESS_TOKEN_ENV: &str = "MSSQL_ACCESS_TOKEN";

/// One tiberius client bound to a side of the copy.
pub struct MssqlSession {
    name: String,
    client: Client<Compat<TcpStream>>,
}

impl MssqlSession {
    /// Open a connection. `name` labels the session in logs and errors.
    pub async fn connect(name: &str, config: &ConnectionConfig) -> Result<Self> {
        let tiberius_config = build_config(name, config)?;
        let client = connect_client(tiberius_config)
            .await
            .map_err(|e| CopyError::connectivity(name, e))?;

        info!("Connected to {} MSSQL: {}", name, config.describe());

        Ok(Self {
            name: name.to_string(),
            client,
        })
    }
}

fn build_config(name: &str, conn: &ConnectionConfig) -> Result<Config> {
    let mut config = Config::new();
    config.host(&conn.host);
    config.port(conn.port);
    config.database(&conn.database);

    match conn.authentication {
        AuthMethod::SqlPassword => {
            config.authentication(TiberiusAuthMethod::sql_server(&conn.user, &conn.password));
        }
        AuthMethod::AadToken => {
            let token = conn
                .access_token
                .clone()
                .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    CopyError::connectivity(
                        name,
                        format!(
                            "aad_token authentication needs access_token or {}",
                            ACCESS_TOKEN_ENV
                        ),
                    )
                })?;
            config.authentication(TiberiusAuthMethod::aad_token(token));
        }
    }

    if conn.encrypt {
        if conn.trust_server_cert {
            config.trust_cert();
        }
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::NotSupported);
    }

    config.packet_size(TDS_MAX_PACKET_SIZE);
    Ok(config)
}

async fn open_tcp(config: &Config) -> std::result::Result<TcpStream, tiberius::error::Error> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| tiberius::error::Error::Io {
            kind: e.kind(),
            message: e.to_string(),
        })?;
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}

/// Connect, following one gateway redirect (Azure SQL).
async fn connect_client(
    mut config: Config,
) -> std::result::Result<Client<Compat<TcpStream>>, tiberius::error::Error> {
    let tcp = open_tcp(&config).await?;
    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!("Redirected to {}:{}", host, port);
            config.host(&host);
            config.port(port);
            let tcp = open_tcp(&config).await?;
            Client::connect(config, tcp.compat_write()).await
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl Session for MssqlSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&mut self, stmt: &Statement) -> Result<ResultSet> {
        debug!(target: "sql", session = %self.name, params = stmt.params.len(), "{}", stmt.sql);
        let started = Instant::now();

        let params: Vec<Box<dyn ToSql>> = stmt.params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stream = self.client.query(stmt.sql.as_str(), &param_refs).await?;
        let columns = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = stream
            .into_first_result()
            .await?
            .into_iter()
            .map(|row| row.into_iter().map(column_data_to_value).collect())
            .collect::<Vec<_>>();

        debug!(
            target: "sql",
            session = %self.name,
            "{} rows in {:?}",
            rows.len(),
            started.elapsed()
        );
        Ok(ResultSet { columns, rows })
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        debug!(target: "sql", session = %self.name, params = stmt.params.len(), "{}", stmt.sql);

        let params: Vec<Box<dyn ToSql>> = stmt.params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let result = self.client.execute(stmt.sql.as_str(), &param_refs).await?;
        Ok(result.total())
    }
}
