//! Pi-hole v6 API operations built on [`SessionClient`]

use pihole_core::{parse_duration, ConnectionTestResult, PiholeResult};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::client::{RequestOptions, SessionClient};
use crate::types::{
    BlockingStatus, DisableOptions, DomainListEntry, DomainListKind, GravityInfo, PiHoleQuery,
    PiHoleQueryResult, PiHoleStatus, QueryStatus, QueryType,
};

const SUMMARY_ENDPOINT: &str = "/api/stats/summary";
const BLOCKING_ENDPOINT: &str = "/api/dns/blocking";
const DOMAINS_ENDPOINT: &str = "/api/domains";
const QUERIES_ENDPOINT: &str = "/api/queries";

pub const DEFAULT_RECENT_QUERY_COUNT: u32 = 100;

/// `/api/stats/summary` response
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SummaryResponse {
    queries: Map<String, Value>,
    clients: Map<String, Value>,
    gravity: Map<String, Value>,
}

/// `/api/dns/blocking` response
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BlockingResponse {
    blocking: Value,
}

/// `/api/queries` response
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct QueriesResponse {
    queries: Vec<Map<String, Value>>,
    records_filtered: Value,
}

/// `/api/domains` response
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DomainsResponse {
    domains: Vec<Map<String, Value>>,
}

/// Pi-hole client
pub struct PiHoleApi {
    client: SessionClient,
}

impl PiHoleApi {
    pub fn new(client: SessionClient) -> Self {
        Self { client }
    }

    pub fn session(&self) -> &SessionClient {
        &self.client
    }

    pub async fn test_connection(&self) -> ConnectionTestResult {
        self.client.test_connection().await
    }

    /// Summary statistics plus the current blocking state
    pub async fn get_status(&self) -> PiholeResult<PiHoleStatus> {
        let (summary, blocking) = tokio::try_join!(
            self.client
                .request::<Option<SummaryResponse>>(SUMMARY_ENDPOINT, RequestOptions::get()),
            self.client
                .request::<Option<BlockingResponse>>(BLOCKING_ENDPOINT, RequestOptions::get()),
        )?;

        Ok(build_status(
            summary.unwrap_or_default(),
            blocking.unwrap_or_default(),
        ))
    }

    pub async fn enable(&self) -> PiholeResult<()> {
        info!("Enabling blocking");
        self.client
            .request::<Value>(BLOCKING_ENDPOINT, RequestOptions::post(json!({ "blocking": true })))
            .await?;
        Ok(())
    }

    pub async fn disable(&self, options: DisableOptions) -> PiholeResult<()> {
        let body = disable_body(&options)?;
        info!(timer = ?body.get("timer"), "Disabling blocking");
        self.client
            .request::<Value>(BLOCKING_ENDPOINT, RequestOptions::post(body))
            .await?;
        Ok(())
    }

    /// Latest query-log entry for `domain`
    pub async fn query_domain(&self, domain: &str) -> PiholeResult<PiHoleQueryResult> {
        let endpoint = format!(
            "{}?domain={}&limit=1",
            QUERIES_ENDPOINT,
            urlencoding::encode(domain)
        );
        let response: Option<QueriesResponse> =
            self.client.request(&endpoint, RequestOptions::get()).await?;

        Ok(build_query_result(domain, response.unwrap_or_default()))
    }

    pub async fn get_allowlist(&self) -> PiholeResult<Vec<DomainListEntry>> {
        self.domain_list(DomainListKind::Allow).await
    }

    pub async fn get_denylist(&self) -> PiholeResult<Vec<DomainListEntry>> {
        self.domain_list(DomainListKind::Deny).await
    }

    pub async fn get_recent_queries(&self, count: u32) -> PiholeResult<Vec<PiHoleQuery>> {
        let endpoint = format!("{}?limit={}", QUERIES_ENDPOINT, count);
        let response: Option<QueriesResponse> =
            self.client.request(&endpoint, RequestOptions::get()).await?;

        let queries: Vec<PiHoleQuery> = response
            .unwrap_or_default()
            .queries
            .iter()
            .map(parse_query_row)
            .collect();
        debug!(count = queries.len(), "Fetched recent queries");
        Ok(queries)
    }

    async fn domain_list(&self, kind: DomainListKind) -> PiholeResult<Vec<DomainListEntry>> {
        let response: Option<DomainsResponse> = self
            .client
            .request(DOMAINS_ENDPOINT, RequestOptions::get())
            .await?;
        Ok(filter_domains(response.unwrap_or_default(), kind))
    }
}

fn build_status(summary: SummaryResponse, blocking: BlockingResponse) -> PiHoleStatus {
    let status = match &blocking.blocking {
        Value::Bool(true) => BlockingStatus::Enabled,
        Value::String(s) if s == "enabled" => BlockingStatus::Enabled,
        _ => BlockingStatus::Disabled,
    };

    let queries = &summary.queries;
    let clients = &summary.clients;
    PiHoleStatus {
        blocking: status,
        dns_queries_today: count_field(queries, "total"),
        ads_blocked_today: count_field(queries, "blocked"),
        ads_percentage_today: number_field(queries, "percent_blocked"),
        unique_domains: count_field(queries, "unique_domains"),
        queries_forwarded: count_field(queries, "forwarded"),
        queries_cached: count_field(queries, "cached"),
        clients_ever_seen: count_field(clients, "total"),
        unique_clients: count_field(clients, "active"),
        gravity: GravityInfo {
            domains_being_blocked: count_field(&summary.gravity, "domains_being_blocked"),
            last_updated: number_field(&summary.gravity, "last_update") as i64,
        },
    }
}

fn disable_body(options: &DisableOptions) -> PiholeResult<Value> {
    let timer = match (&options.duration, options.seconds) {
        (Some(duration), _) if !duration.trim().is_empty() => Some(parse_duration(duration)?),
        (_, Some(seconds)) => Some(seconds),
        _ => None,
    };

    let mut body = json!({ "blocking": false });
    if let Some(seconds) = timer.filter(|s| *s > 0) {
        body["timer"] = json!(seconds);
    }
    Ok(body)
}

fn build_query_result(domain: &str, response: QueriesResponse) -> PiHoleQueryResult {
    let total = number(&response.records_filtered).max(0.0) as u64;

    let Some(latest) = response.queries.first() else {
        let (status, reason) = if total > 0 {
            (QueryStatus::NoRecentQueries, "No recent queries found")
        } else {
            (QueryStatus::NeverQueried, "Domain has never been queried")
        };
        return PiHoleQueryResult {
            domain: domain.to_string(),
            status,
            reason: reason.to_string(),
            query_type: QueryType::A,
            last_seen: 0.0,
            query_count: total,
        };
    };

    let code = string_field(latest, "status");
    PiHoleQueryResult {
        domain: domain.to_string(),
        status: QueryStatus::from_code(&code),
        reason: QueryStatus::describe(&code),
        query_type: QueryType::from_code(&string_field(latest, "type")),
        last_seen: number_field(latest, "time"),
        query_count: total,
    }
}

fn parse_query_row(row: &Map<String, Value>) -> PiHoleQuery {
    // v6 reports the client as {ip, name}; older builds use a bare string
    let client = match row.get("client") {
        Some(Value::Object(client)) => non_empty(string_field(client, "name"))
            .unwrap_or_else(|| string_field(client, "ip")),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    let timestamp = match row.get("time") {
        Some(value) if !value.is_null() => number(value),
        _ => number_field(row, "timestamp"),
    };

    PiHoleQuery {
        domain: string_field(row, "domain"),
        status: QueryStatus::from_code(&string_field(row, "status")),
        query_type: QueryType::from_code(&string_field(row, "type")),
        client,
        timestamp,
    }
}

fn filter_domains(response: DomainsResponse, kind: DomainListKind) -> Vec<DomainListEntry> {
    response
        .domains
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some(kind.as_str()))
        .map(|item| DomainListEntry {
            id: count_field(item, "id"),
            domain: string_field(item, "domain"),
            kind,
            enabled: item.get("enabled").and_then(Value::as_bool) != Some(false),
            date_added: number_field(item, "date_added") as i64,
            date_modified: number_field(item, "date_modified") as i64,
            comment: string_field(item, "comment"),
        })
        .collect()
}

/// Lenient numeric read: numbers and numeric strings, anything else is 0
fn number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn number_field(map: &Map<String, Value>, key: &str) -> f64 {
    map.get(key).map(number).unwrap_or(0.0)
}

fn count_field(map: &Map<String, Value>, key: &str) -> u64 {
    number_field(map, key).max(0.0) as u64
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
