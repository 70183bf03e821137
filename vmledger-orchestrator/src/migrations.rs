use sqlx::{Pool, Postgres};

// Every statement is idempotent; the schema is re-applied on each start.
const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS providers (
        id UUID PRIMARY KEY,
        name VARCHAR(100) UNIQUE NOT NULL,
        code VARCHAR(50) NOT NULL,
        status VARCHAR(50) NOT NULL DEFAULT 'active',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE TABLE IF NOT EXISTS instances (
        id UUID PRIMARY KEY,
        provider_id UUID NOT NULL REFERENCES providers(id),
        name VARCHAR(255) NOT NULL,
        status VARCHAR(50) NOT NULL DEFAULT 'creating',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    );
    CREATE INDEX IF NOT EXISTS idx_instances_provider_live
        ON instances (provider_id, name) WHERE deleted_at IS NULL;
    CREATE TABLE IF NOT EXISTS port_mappings (
        id UUID PRIMARY KEY,
        instance_id UUID NOT NULL REFERENCES instances(id),
        provider_id UUID NOT NULL REFERENCES providers(id),
        host_port INTEGER NOT NULL,
        guest_port INTEGER NOT NULL,
        protocol VARCHAR(10) NOT NULL DEFAULT 'tcp',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE INDEX IF NOT EXISTS idx_port_mappings_instance ON port_mappings (instance_id);
    CREATE TABLE IF NOT EXISTS tasks (
        id UUID PRIMARY KEY,
        provider_id UUID,
        task_type VARCHAR(50) NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'pending',
        progress INTEGER NOT NULL DEFAULT 0,
        message TEXT,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMPTZ
    );
    CREATE TABLE IF NOT EXISTS action_logs (
        id UUID PRIMARY KEY,
        action_type VARCHAR(100) NOT NULL,
        component VARCHAR(50) NOT NULL,
        status VARCHAR(20) NOT NULL,
        error_message TEXT,
        provider_id UUID,
        instance_id UUID,
        metadata JSONB,
        duration_ms INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMPTZ
    );
    CREATE TABLE IF NOT EXISTS mock_provider_instances (
        provider_id UUID NOT NULL,
        provider_instance_id VARCHAR(255) NOT NULL,
        name VARCHAR(255) NOT NULL,
        zone_code VARCHAR(50) NOT NULL DEFAULT 'mock-zone-1',
        status VARCHAR(50) NOT NULL DEFAULT 'running',
        ip_address VARCHAR(64),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (provider_id, provider_instance_id)
    )
"#;

pub async fn run_inline_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    tracing::info!("running inline migrations");

    for statement in SCHEMA_SQL.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(pool).await?;
        }
    }

    tracing::info!("inline migrations applied");
    Ok(())
}
