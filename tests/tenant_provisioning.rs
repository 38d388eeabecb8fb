use cmk_control_plane::tenants::{
    create_default_groups, create_schema, GroupsStatus, ProvisioningError, SchemaStatus, Tenant,
    TenantProbe,
};
use futures_util::future::join_all;
use sqlx::PgPool;

async fn group_count(pool: &PgPool, tenant: &Tenant) -> i64 {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM \"{}\".groups",
        tenant.schema_name
    ))
    .fetch_one(pool)
    .await
    .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn schema_creation_is_idempotent(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let tenant = Tenant::new("idempotent-tenant", "eu10").unwrap();
    let probe = TenantProbe::new(pool.clone());

    let before = probe.check(&tenant).await.unwrap();
    assert_eq!(before.schema, SchemaStatus::NotFound);
    assert_eq!(before.groups, GroupsStatus::NotFound);

    create_schema(&pool, &tenant).await.unwrap();
    let err = create_schema(&pool, &tenant).await.unwrap_err();
    assert!(err.is_onboarding_in_progress(), "unexpected error: {err}");

    let after = probe.check(&tenant).await.unwrap();
    assert_eq!(after.schema, SchemaStatus::Exists);
    assert_eq!(after.groups, GroupsStatus::NotFound);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants WHERE id = $1")
        .bind(&tenant.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn concurrent_schema_creation_has_one_winner(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let tenant = Tenant::new("racing-tenant", "eu10").unwrap();

    let results = join_all((0..20).map(|_| create_schema(&pool, &tenant))).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let in_progress = results
        .iter()
        .filter(|r| matches!(r, Err(err) if err.is_onboarding_in_progress()))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(in_progress, 19);

    let schemas: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = $1")
            .bind(&tenant.schema_name)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(schemas, 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn concurrent_group_creation_has_one_winner(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let tenant = Tenant::new("group-race", "eu10").unwrap();
    create_schema(&pool, &tenant).await.unwrap();

    let results = join_all((0..3).map(|_| create_default_groups(&pool, &tenant))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(ProvisioningError::is_onboarding_in_progress));
    assert_eq!(group_count(&pool, &tenant).await, 2);

    let probe = TenantProbe::new(pool.clone()).check(&tenant).await.unwrap();
    assert!(probe.is_provisioned());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn failed_group_insert_leaves_no_groups(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let tenant = Tenant::new("atomic-groups", "eu10").unwrap();
    create_schema(&pool, &tenant).await.unwrap();

    let schema = &tenant.schema_name;
    sqlx::query(&format!(
        r#"
        CREATE FUNCTION "{schema}".reject_auditor() RETURNS trigger AS $$
        BEGIN
            IF NEW.name = 'TenantAuditor' THEN
                RAISE EXCEPTION 'auditor group rejected';
            END IF;
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        "#
    ))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        r#"CREATE TRIGGER reject_auditor BEFORE INSERT ON "{schema}".groups
           FOR EACH ROW EXECUTE FUNCTION "{schema}".reject_auditor()"#
    ))
    .execute(&pool)
    .await
    .unwrap();

    let err = create_default_groups(&pool, &tenant).await.unwrap_err();
    assert!(
        matches!(err, ProvisioningError::CreatingGroup { group: "TenantAuditor", .. }),
        "unexpected error: {err}"
    );
    assert!(!err.is_onboarding_in_progress());
    assert_eq!(group_count(&pool, &tenant).await, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn tenant_tables_stay_inside_their_schema(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let first = Tenant::new("tenant-one", "eu10").unwrap();
    let second = Tenant::new("tenant-two", "eu10").unwrap();
    for tenant in [&first, &second] {
        create_schema(&pool, tenant).await.unwrap();
    }
    create_default_groups(&pool, &first).await.unwrap();

    assert_eq!(group_count(&pool, &first).await, 2);
    assert_eq!(group_count(&pool, &second).await, 0);

    let public_groups: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public' AND table_name = 'groups'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(public_groups, 0);
}
