//! A minimal client for querying the exchange's subgraph.

use {
    crate::gauges::TvlSource,
    alloy::primitives::Address,
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    reqwest::{Client, Url},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::{Map, Value, json},
    std::collections::HashMap,
};

const POOL_TVLS_QUERY: &str = r#"
    query PoolTvls($ids: [ID!]!) {
        pools(where: { id_in: $ids }) {
            id
            totalValueLockedUSD
        }
    }
"#;

pub struct SubgraphClient {
    client: Client,
    url: Url,
}

impl SubgraphClient {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    /// Performs the specified GraphQL query.
    pub async fn query<T>(&self, query: &str, variables: Option<Map<String, Value>>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.client
            .post(self.url.clone())
            .json(&Query { query, variables })
            .send()
            .await?
            .error_for_status()?
            .json::<QueryResponse<T>>()
            .await?
            .into_result()
    }

    /// Total value locked in USD per pool. Pools unknown to the subgraph are
    /// missing from the result.
    pub async fn pool_tvls(&self, pools: &[Address]) -> Result<HashMap<Address, f64>> {
        if pools.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = pools
            .iter()
            .map(|pool| const_hex::encode_prefixed(pool))
            .collect::<Vec<_>>();
        let mut variables = Map::new();
        variables.insert("ids".to_string(), json!(ids));
        let data: PoolsData = self.query(POOL_TVLS_QUERY, Some(variables)).await?;
        tvls_by_pool(data)
    }
}

fn tvls_by_pool(data: PoolsData) -> Result<HashMap<Address, f64>> {
    data.pools
        .into_iter()
        .map(|pool| {
            let tvl = pool
                .total_value_locked_usd
                .parse::<f64>()
                .with_context(|| {
                    format!(
                        "invalid TVL {:?} for pool {}",
                        pool.total_value_locked_usd, pool.id
                    )
                })?;
            Ok((pool.id, tvl))
        })
        .collect()
}

#[async_trait]
impl TvlSource for SubgraphClient {
    async fn pool_tvls(&self, pools: Vec<Address>) -> Result<HashMap<Address, f64>> {
        SubgraphClient::pool_tvls(self, &pools).await
    }
}

#[derive(Serialize)]
struct Query<'a> {
    query: &'a str,
    variables: Option<Map<String, Value>>,
}

/// Response envelope; exactly one of `data` and `errors` is expected.
#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    #[serde(default = "no_data")]
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<QueryError>>,
}

impl<T> QueryResponse<T> {
    fn into_result(self) -> Result<T> {
        match (self.data, self.errors) {
            (Some(data), None) => Ok(data),
            (None, Some(errors)) if !errors.is_empty() => {
                for extra in &errors[1..] {
                    tracing::warn!(message = %extra.message, "additional subgraph error");
                }
                bail!("{}", errors[0])
            }
            _ => bail!("invalid subgraph response"),
        }
    }
}

#[derive(Debug, Deserialize, thiserror::Error)]
#[error("{message}")]
struct QueryError {
    message: String,
}

// `#[serde(default)]` alone would require `T: Default`.
fn no_data<T>() -> Option<T> {
    None
}

#[derive(Debug, Deserialize)]
struct PoolsData {
    pools: Vec<PoolTvl>,
}

#[derive(Debug, Deserialize)]
struct PoolTvl {
    id: Address,
    #[serde(rename = "totalValueLockedUSD")]
    total_value_locked_usd: String,
}
