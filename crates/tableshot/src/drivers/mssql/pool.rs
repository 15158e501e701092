//! Pooled Tiberius connections.

use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{CloneError, Result};

/// Maximum TDS packet size.
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection pool timeouts.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Long copies can leave a connection idle while the other side works.
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

pub type MssqlClient = Client<Compat<TcpStream>>;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: ServerConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

fn io_error(e: std::io::Error, context: &str) -> tiberius::error::Error {
    tiberius::error::Error::Io {
        kind: e.kind(),
        message: format!("{}: {}", context, e),
    }
}

/// Enable TCP keepalives; on failure the plain stream is kept.
fn with_keepalive(tcp: TcpStream) -> std::result::Result<TcpStream, tiberius::error::Error> {
    let std_tcp = tcp.into_std().map_err(|e| io_error(e, "detaching socket"))?;
    let socket = socket2::Socket::from(std_tcp);

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_INTERVAL)
        .with_interval(TCP_KEEPALIVE_INTERVAL);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
    }

    let std_tcp: std::net::TcpStream = socket.into();
    std_tcp.set_nonblocking(true).ok();
    TcpStream::from_std(std_tcp).map_err(|e| io_error(e, "Failed to convert socket"))
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = MssqlClient;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| io_error(e, "connecting"))?;
        tcp.set_nodelay(true).ok();

        let tcp = with_keepalive(tcp)?;
        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Build a pool and check that a connection can be made.
pub async fn connect_pool(config: &ServerConfig) -> Result<Pool<TiberiusConnectionManager>> {
    let manager = TiberiusConnectionManager::new(config.clone());
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .min_idle(Some(1))
        .connection_timeout(POOL_CONNECTION_TIMEOUT)
        .idle_timeout(Some(POOL_IDLE_TIMEOUT))
        .max_lifetime(Some(POOL_MAX_LIFETIME))
        .test_on_check_out(true)
        .build(manager)
        .await
        .map_err(|e| CloneError::pool(e, "creating MSSQL pool"))?;

    {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| CloneError::pool(e, "testing MSSQL connection"))?;
        conn.simple_query("SELECT 1").await?.into_row().await?;
    }

    info!(
        "Connected to MSSQL: {}:{}/{} (pool_size={})",
        config.host, config.port, config.database, config.pool_size
    );
    Ok(pool)
}
