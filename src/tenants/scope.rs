use sqlx::{Executor, PgConnection, PgPool, Postgres, Transaction};

/// Quotes an identifier for interpolation into DDL; embedded quotes are doubled.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Points unqualified table names at the tenant schema for the rest of the transaction.
pub async fn scope_to_schema(conn: &mut PgConnection, schema_name: &str) -> Result<(), sqlx::Error> {
    let statement = format!(
        "SET LOCAL search_path TO {}, public",
        quote_identifier(schema_name)
    );
    conn.execute(statement.as_str()).await?;
    Ok(())
}

/// Opens a transaction whose unqualified statements resolve inside `schema_name`.
pub async fn begin_tenant_tx(
    pool: &PgPool,
    schema_name: &str,
) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    scope_to_schema(&mut tx, schema_name).await?;
    Ok(tx)
}
