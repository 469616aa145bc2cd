use crate::db::loader::BatchSink;
use crate::db::models::AirQualityRecord;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Whether `table` resolves to an existing relation on the search path.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    /// Count stored rows for a city. `table` must already be validated.
    pub async fn count_for_city(&self, table: &str, city: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {} WHERE city = $1",
            table
        ))
        .bind(city)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl BatchSink for Repository {
    /// Insert one batch with a single multi-row statement.
    ///
    /// The table name comes from validated configuration and is interpolated;
    /// every value is bound.
    async fn insert_batch(&self, table: &str, batch: &[AirQualityRecord]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        debug!("Inserting {} rows into {}", batch.len(), table);

        let mut query_builder = sqlx::QueryBuilder::new(format!(
            "INSERT INTO {} (
                city, time,
                pm10, pm2_5, carbon_monoxide, nitrogen_dioxide, sulphur_dioxide, ozone, uv_index,
                aqi_category, severity_score, risk_flag, hour
            ) ",
            table
        ));

        query_builder.push_values(batch, |mut b, rec| {
            b.push_bind(&rec.city)
                .push_bind(rec.time)
                .push_bind(rec.pm10)
                .push_bind(rec.pm2_5)
                .push_bind(rec.carbon_monoxide)
                .push_bind(rec.nitrogen_dioxide)
                .push_bind(rec.sulphur_dioxide)
                .push_bind(rec.ozone)
                .push_bind(rec.uv_index)
                .push_bind(&rec.aqi_category)
                .push_bind(rec.severity_score)
                .push_bind(&rec.risk_flag)
                .push_bind(rec.hour);
        });

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
