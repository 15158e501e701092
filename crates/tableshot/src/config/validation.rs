//! Configuration validation.

use super::{Config, ServerConfig};
use crate::core::identifier::validate_identifier;
use crate::error::{CloneError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_server("source", &config.source)?;
    if let Some(target) = &config.target {
        validate_server("target", target)?;
    }

    for schema in &config.schemas {
        validate_identifier(schema)
            .map_err(|e| CloneError::Config(format!("schemas: {}", detail(e))))?;
    }

    for (i, entry) in config.tables.iter().enumerate() {
        if entry.name.trim().is_empty() {
            return Err(CloneError::Config(format!("tables[{}].name is required", i)));
        }
    }
    for table in config.table_configurations()? {
        if table.table.schema != "*" {
            validate_identifier(&table.table.schema)?;
        }
        validate_identifier(&table.table.name)?;
    }

    // one connection streams source rows while another executes batches
    if config.same_connection() && config.source.pool_size < 2 {
        return Err(CloneError::Config(
            "source.pool_size must be at least 2 when cloning within one database".to_string(),
        ));
    }

    let clone = &config.clone;
    if clone.batch_bytes == 0 {
        return Err(CloneError::Config(
            "clone.batch_bytes must be at least 1".to_string(),
        ));
    }
    for schema in [&clone.source_schema, &clone.target_schema].into_iter().flatten() {
        validate_identifier(schema)
            .map_err(|e| CloneError::Config(format!("clone schema: {}", detail(e))))?;
    }

    Ok(())
}

fn validate_server(section: &str, server: &ServerConfig) -> Result<()> {
    if server.host.is_empty() {
        return Err(CloneError::Config(format!("{}.host is required", section)));
    }
    if server.database.is_empty() {
        return Err(CloneError::Config(format!("{}.database is required", section)));
    }
    if server.user.is_empty() {
        return Err(CloneError::Config(format!("{}.user is required", section)));
    }
    if server.pool_size == 0 {
        return Err(CloneError::Config(format!(
            "{}.pool_size must be at least 1",
            section
        )));
    }
    Ok(())
}

fn detail(err: CloneError) -> String {
    match err {
        CloneError::Config(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CloneConfig, TableEntry};
    use crate::core::ReferencedByOptions;

    fn server(database: &str) -> ServerConfig {
        ServerConfig {
            host: "localhost".to_string(),
            port: 1433,
            database: database.to_string(),
            user: "sa".to_string(),
            password: "password".to_string(),
            encrypt: false,
            trust_server_cert: true,
            pool_size: 4,
        }
    }

    fn valid_config() -> Config {
        Config {
            source: server("shop"),
            target: None,
            schemas: vec!["sales".to_string()],
            tables: vec![TableEntry {
                name: "sales.Orders".to_string(),
                referenced: ReferencedByOptions::DESCENDING,
            }],
            clone: CloneConfig {
                source_schema: Some("sales".to_string()),
                target_schema: Some("sales2".to_string()),
                ..CloneConfig::default()
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_target_user() {
        let mut config = valid_config();
        let mut target = server("archive");
        target.user = String::new();
        config.target = Some(target);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unqualified_table_name() {
        let mut config = valid_config();
        config.tables[0].name = "Orders".to_string();
        assert!(matches!(validate(&config), Err(CloneError::Config(_))));
    }

    #[test]
    fn test_wildcard_schema_is_allowed() {
        let mut config = valid_config();
        config.tables[0].name = "*.Audit".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = valid_config();
        config.source.pool_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_single_connection_pool_needs_separate_target() {
        let mut config = valid_config();
        config.source.pool_size = 1;
        assert!(matches!(validate(&config), Err(CloneError::Config(ref m)) if m.contains("pool_size")));

        config.target = Some(server("archive"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.clone.batch_bytes = 0;
        assert!(matches!(validate(&config), Err(CloneError::Config(_))));
    }

    #[test]
    fn test_same_connection_detection() {
        let mut config = valid_config();
        assert!(config.same_connection());

        config.target = Some(server("SHOP"));
        assert!(config.same_connection());

        config.target = Some(server("archive"));
        assert!(!config.same_connection());
    }

    #[test]
    fn test_server_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_from_yaml_defaults() {
        let yaml = r#"
source:
  host: db
  database: shop
  user: sa
  password: secret
schemas: [sales, ref]
tables:
  - name: sales.Orders
    referenced: descending|schema
  - name: "*.Audit"
    referenced: schema-only
  - name: sales.Products
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.port, 1433);
        assert!(config.source.encrypt);
        assert!(config.target.is_none());
        assert!(config.clone.skip_shared_tables);
        assert!(!config.clone.create_missing_schemas);
        assert_eq!(config.clone.batch_bytes, 256 * 1024);

        let seeds = config.table_configurations().unwrap();
        assert_eq!(seeds.len(), 3);
        assert_eq!(
            seeds[0].referenced_by,
            ReferencedByOptions::DESCENDING.within_schema()
        );
        assert_eq!(seeds[1].table.schema, "*");
        assert!(seeds[2].referenced_by.is_disabled());
        assert!(config.scope().contains("REF"));
    }

    #[test]
    fn test_from_yaml_rejects_unknown_flag() {
        let yaml = r#"
source: { host: db, database: shop, user: sa }
tables:
  - name: sales.Orders
    referenced: sideways
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
