// Copyright (C) 2026  pgexporter contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! PostgreSQL data source over a shared `sqlx` pool

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::query::Query;
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};
use std::fmt;
use tracing::{debug, info};

use super::{DataSource, QueryError, QueryResult, RowSet, SqlParam, SqlValue};

/// Connection cap applied once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum open connections
    pub max_connections: u32,
    /// Idle connections kept open
    pub min_connections: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 3,
            min_connections: 0,
        }
    }
}

/// Data source backed by a single shared PostgreSQL pool
#[derive(Clone)]
pub struct PgDataSource {
    pool: PgPool,
}

impl fmt::Debug for PgDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgDataSource")
            .field("size", &self.pool.size())
            .field("idle", &self.pool.num_idle())
            .finish()
    }
}

impl PgDataSource {
    /// Connect to the database named by `dsn`
    ///
    /// The first connection is opened eagerly so an unreachable database
    /// surfaces at startup instead of on the first scrape.
    pub async fn connect(dsn: &str, settings: PoolSettings) -> QueryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .connect(dsn)
            .await?;

        info!(
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Int(value) => query.bind(*value),
            SqlParam::Text(value) => query.bind(value.as_str()),
        };
    }
    query
}

/// How a result column is turned into a [`SqlValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnDecoder {
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Numeric,
    Bool,
    Text,
    Inet,
    Cidr,
    Unsupported,
}

impl ColumnDecoder {
    /// Decoder for a built-in type, by its database type name
    fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "INT2" => Self::Int2,
            "INT4" => Self::Int4,
            "INT8" => Self::Int8,
            "OID" => Self::Oid,
            "FLOAT4" => Self::Float4,
            "FLOAT8" => Self::Float8,
            "NUMERIC" => Self::Numeric,
            "BOOL" => Self::Bool,
            "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" | "UNKNOWN" => Self::Text,
            "INET" => Self::Inet,
            "CIDR" => Self::Cidr,
            _ => Self::Unsupported,
        }
    }

    /// Decoder for a resolved result column type
    ///
    /// Enum labels travel as their text; domains decode as their base type.
    fn for_type(type_info: &PgTypeInfo) -> Self {
        match type_info.kind() {
            PgTypeKind::Enum(_) => Self::Text,
            PgTypeKind::Domain(base) => Self::for_type(base),
            _ => Self::from_type_name(type_info.name()),
        }
    }
}

/// Text PostgreSQL prints for an `inet` or `cidr` value
///
/// `inet` omits the prefix length of a single host address.
fn network_text(network: IpNetwork, cidr: bool) -> String {
    let host_prefix = match network {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if !cidr && network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

fn decode_row(row: &PgRow) -> QueryResult<Vec<SqlValue>> {
    row.columns()
        .iter()
        .map(|column| decode_column(row, column.ordinal(), column.name(), column.type_info()))
        .collect()
}

fn decode_column(
    row: &PgRow,
    index: usize,
    name: &str,
    type_info: &PgTypeInfo,
) -> QueryResult<SqlValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let unsupported = || QueryError::Decode {
        column: name.to_string(),
        type_name: type_info.name().to_string(),
    };

    let value = match ColumnDecoder::for_type(type_info) {
        ColumnDecoder::Int2 => SqlValue::Int(row.try_get::<i16, _>(index)?.into()),
        ColumnDecoder::Int4 => SqlValue::Int(row.try_get::<i32, _>(index)?.into()),
        ColumnDecoder::Int8 => SqlValue::Int(row.try_get::<i64, _>(index)?),
        ColumnDecoder::Oid => SqlValue::Int(row.try_get::<Oid, _>(index)?.0.into()),
        ColumnDecoder::Float4 => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        ColumnDecoder::Float8 => SqlValue::Float(row.try_get::<f64, _>(index)?),
        ColumnDecoder::Numeric => {
            let decimal = row.try_get::<Decimal, _>(index)?;
            SqlValue::Float(decimal.to_f64().ok_or_else(unsupported)?)
        }
        ColumnDecoder::Bool => SqlValue::Bool(row.try_get::<bool, _>(index)?),
        // enum and domain columns fail the driver's type check for String
        ColumnDecoder::Text => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
        ColumnDecoder::Inet => SqlValue::Text(network_text(row.try_get(index)?, false)),
        ColumnDecoder::Cidr => SqlValue::Text(network_text(row.try_get(index)?, true)),
        ColumnDecoder::Unsupported => return Err(unsupported()),
    };

    Ok(value)
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn query_row(&self, sql: &str, params: &[SqlParam]) -> QueryResult<Vec<SqlValue>> {
        debug!(sql, params = params.len(), "query_row");
        let row = bind_params(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(QueryError::NoRows)?;
        decode_row(&row)
    }

    async fn query_rows(&self, sql: &str, params: &[SqlParam]) -> QueryResult<RowSet> {
        debug!(sql, params = params.len(), "query_rows");
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = rows.iter().map(decode_row).collect::<QueryResult<Vec<_>>>()?;

        Ok(RowSet { columns, rows })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_settings_default() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_connections, 3);
        assert_eq!(settings.min_connections, 0);
    }

    #[test]
    fn test_decoder_by_type_name() {
        for (name, decoder) in [
            ("INT2", ColumnDecoder::Int2),
            ("INT8", ColumnDecoder::Int8),
            ("OID", ColumnDecoder::Oid),
            ("FLOAT8", ColumnDecoder::Float8),
            ("NUMERIC", ColumnDecoder::Numeric),
            ("BOOL", ColumnDecoder::Bool),
            ("NAME", ColumnDecoder::Text),
            ("BPCHAR", ColumnDecoder::Text),
            ("INET", ColumnDecoder::Inet),
            ("CIDR", ColumnDecoder::Cidr),
            ("JSONB", ColumnDecoder::Unsupported),
            ("TIMESTAMPTZ", ColumnDecoder::Unsupported),
        ] {
            assert_eq!(ColumnDecoder::from_type_name(name), decoder, "{}", name);
        }
    }

    #[test]
    fn test_decoder_for_builtin_types() {
        use sqlx::Type;

        assert_eq!(
            ColumnDecoder::for_type(&<Decimal as Type<Postgres>>::type_info()),
            ColumnDecoder::Numeric
        );
        assert_eq!(
            ColumnDecoder::for_type(&<Oid as Type<Postgres>>::type_info()),
            ColumnDecoder::Oid
        );
        assert_eq!(
            ColumnDecoder::for_type(&<IpNetwork as Type<Postgres>>::type_info()),
            ColumnDecoder::Inet
        );
        assert_eq!(
            ColumnDecoder::for_type(&<i32 as Type<Postgres>>::type_info()),
            ColumnDecoder::Int4
        );
    }

    #[test]
    fn test_network_text_matches_server_rendering() {
        let host: IpNetwork = "10.0.0.7/32".parse().unwrap();
        let subnet: IpNetwork = "10.0.0.0/24".parse().unwrap();
        let v6: IpNetwork = "::1/128".parse().unwrap();

        assert_eq!(network_text(host, false), "10.0.0.7");
        assert_eq!(network_text(host, true), "10.0.0.7/32");
        assert_eq!(network_text(subnet, false), "10.0.0.0/24");
        assert_eq!(network_text(v6, false), "::1");
    }

    #[test]
    fn test_numeric_converts_to_float() {
        let decimal: Decimal = "1234.5678".parse().unwrap();
        assert_eq!(decimal.to_f64(), Some(1234.5678));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_dsn() {
        let result = PgDataSource::connect("not a dsn", PoolSettings::default()).await;
        assert!(matches!(result, Err(QueryError::Database(_))));
    }
}
