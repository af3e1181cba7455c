use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection,
};

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

/// Whether the URL explicitly opts out of TLS (local development databases).
fn tls_disabled(database_url: &str) -> bool {
    database_url.contains("sslmode=disable")
}

pub fn establish_connection_pool(database_url: &str, max_size: usize) -> anyhow::Result<DbPool> {
    let config = if tls_disabled(database_url) {
        tracing::warn!("Connecting to the database without TLS (sslmode=disable)");
        AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url)
    } else {
        let mut manager_config = ManagerConfig::default();
        manager_config.custom_setup =
            Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

        AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
            database_url,
            manager_config,
        )
    };

    let pool = Pool::builder(config).max_size(max_size).build()?;

    Ok(pool)
}
