// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! JSON-lines request protocol for operator tooling.
//!
//! One request per line: `{"id": "...", "method": "...", "params": {...}}`.
//! One response per line: `{"id", "result"}` or `{"id", "error": {code, message}}`.

use crate::debug::{execute_query, NodeDescriptor, MAX_DEPTH};
use crate::dom::harvest_root;
use crate::error::{HarvestError, Result};
use crate::patterns::{PatternService, RescrapeTarget};
use scraper::Html;
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

/// Methods understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Match,
    CommitScrape,
    Rescrape,
    DeletePattern,
    ListPatterns,
    Query,
    Snapshot,
}

impl FromStr for Method {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "match" => Ok(Self::Match),
            "commit_scrape" => Ok(Self::CommitScrape),
            "rescrape" => Ok(Self::Rescrape),
            "delete_pattern" => Ok(Self::DeletePattern),
            "list_patterns" => Ok(Self::ListPatterns),
            "query" => Ok(Self::Query),
            "snapshot" => Ok(Self::Snapshot),
            _ => Err(HarvestError::InvalidParams(format!("unknown method: {s}"))),
        }
    }
}

/// A parsed protocol request.
#[derive(Debug)]
pub struct Request {
    pub id: String,
    pub method: Method,
    pub params: Value,
}

/// Parse a JSON request line.
pub fn parse_request(json: &str) -> Result<Request> {
    let v: Value = serde_json::from_str(json)
        .map_err(|e| HarvestError::InvalidParams(format!("malformed request: {e}")))?;

    let id = request_id(&v);

    let method_str = v
        .get("method")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HarvestError::InvalidParams("missing 'method' field".into()))?;
    let method = method_str.parse()?;

    let params = v
        .get("params")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    Ok(Request { id, method, params })
}

fn request_id(v: &Value) -> String {
    match v.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Format a successful response (newline-terminated).
pub fn format_response(id: &str, result: Value) -> String {
    let resp = serde_json::json!({
        "id": id,
        "result": result,
    });
    format!("{resp}\n")
}

/// Format an error response (newline-terminated).
pub fn format_error(id: &str, code: &str, message: &str) -> String {
    let resp = serde_json::json!({
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    });
    format!("{resp}\n")
}

fn param_str<'p>(params: &'p Value, key: &str) -> Result<&'p str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HarvestError::InvalidParams(format!("missing string param '{key}'")))
}

/// Everything a request may act on.
pub struct Context<'a> {
    pub service: &'a PatternService,
    /// Current page markup.
    pub markup: &'a str,
    pub harvest_roots: &'a [String],
}

/// Execute one request.
pub fn dispatch(request: &Request, ctx: &Context<'_>) -> Result<Value> {
    let params = &request.params;
    debug!(id = %request.id, method = ?request.method, "dispatch");

    match request.method {
        Method::Match => {
            let fragment = param_str(params, "fragment")?;
            Ok(serde_json::to_value(
                ctx.service.match_fragment(fragment, ctx.markup)?,
            )?)
        }
        Method::CommitScrape => {
            let fragment = param_str(params, "fragment")?;
            let name = param_str(params, "name")?;
            let (resp, _) = ctx.service.commit_scrape(fragment, name, ctx.markup)?;
            Ok(serde_json::to_value(resp)?)
        }
        Method::Rescrape => {
            let target = match params.get("name").and_then(Value::as_str) {
                None | Some("all") | Some("*") => RescrapeTarget::All,
                Some(name) => RescrapeTarget::Named(name.to_string()),
            };
            Ok(serde_json::to_value(
                ctx.service.rescrape(&target, ctx.markup)?,
            )?)
        }
        Method::DeletePattern => {
            let name = param_str(params, "name")?;
            ctx.service.delete(name)?;
            Ok(serde_json::json!({ "deleted": name }))
        }
        Method::ListPatterns => Ok(serde_json::to_value(ctx.service.store().list()?)?),
        Method::Query => {
            let selector = param_str(params, "selector")?;
            let document = Html::parse_document(ctx.markup);
            Ok(serde_json::to_value(execute_query(&document, selector))?)
        }
        Method::Snapshot => {
            let document = Html::parse_document(ctx.markup);
            let root = harvest_root(&document, ctx.harvest_roots);
            let tree = NodeDescriptor::tree(&root, MAX_DEPTH);
            Ok(serde_json::json!({ "tree": serde_json::to_value(tree)? }))
        }
    }
}

/// Parse, execute and format one request line.
pub fn handle_line(line: &str, ctx: &Context<'_>) -> String {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(e) => {
            let id = serde_json::from_str::<Value>(line)
                .map(|v| request_id(&v))
                .unwrap_or_else(|_| "unknown".to_string());
            return format_error(&id, e.code(), &e.to_string());
        }
    };

    match dispatch(&request, ctx) {
        Ok(result) => format_response(&request.id, result),
        Err(e) => format_error(&request.id, e.code(), &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::MemoryPatternStore;

    const PAGE: &str = r#"<html><body><div id="app">
        <div class="row item"><span>one</span></div>
        <div class="row item"><span>two</span></div>
    </div></body></html>"#;

    fn service() -> PatternService {
        PatternService::new(Box::new(MemoryPatternStore::new()), "test", vec!["#app".into()])
    }

    fn call(svc: &PatternService, line: &str) -> Value {
        let roots = vec!["#app".to_string()];
        let ctx = Context {
            service: svc,
            markup: PAGE,
            harvest_roots: &roots,
        };
        serde_json::from_str(handle_line(line, &ctx).trim()).unwrap()
    }

    #[test]
    fn test_parse_match_request() {
        let req = parse_request(r#"{"id": "r1", "method": "match", "params": {"fragment": "<p></p>"}}"#)
            .unwrap();
        assert_eq!(req.id, "r1");
        assert_eq!(req.method, Method::Match);
    }

    #[test]
    fn test_parse_unknown_method() {
        let json = r#"{"id": "x", "method": "foobar", "params": {}}"#;
        assert!(parse_request(json).is_err());
    }

    #[test]
    fn test_format_error() {
        let resp = format_error("r2", "E_PARSE", "bad");
        let parsed: Value = serde_json::from_str(resp.trim()).unwrap();
        assert_eq!(parsed["id"], "r2");
        assert_eq!(parsed["error"]["code"], "E_PARSE");
    }

    #[test]
    fn test_match_roundtrip() {
        let svc = service();
        let resp = call(
            &svc,
            r#"{"id": "m", "method": "match", "params": {"fragment": "<div class=\"row item\"><span>X</span></div>"}}"#,
        );
        assert_eq!(resp["id"], "m");
        assert_eq!(resp["result"]["count"], 2);
        assert_eq!(resp["result"]["matches"][1]["text"], "two");
    }

    #[test]
    fn test_commit_and_list() {
        let svc = service();
        let resp = call(
            &svc,
            r#"{"id": 7, "method": "commit_scrape", "params": {"fragment": "<div class=\"row item\"><span>X</span></div>", "name": "rows"}}"#,
        );
        assert_eq!(resp["id"], "7");
        assert_eq!(resp["result"], serde_json::json!({"count": 2, "name": "rows"}));

        let list = call(&svc, r#"{"id": "l", "method": "list_patterns"}"#);
        assert_eq!(list["result"][0]["name"], "rows");

        let again = call(&svc, r#"{"id": "r", "method": "rescrape", "params": {"name": "rows"}}"#);
        assert_eq!(again["result"][0]["count"], 2);
    }

    #[test]
    fn test_error_codes_surface() {
        let svc = service();
        let resp = call(&svc, r#"{"id": "e", "method": "delete_pattern", "params": {"name": "nope"}}"#);
        assert_eq!(resp["error"]["code"], "E_PATTERN_NOT_FOUND");

        let resp = call(&svc, r#"{"id": "e2", "method": "match", "params": {}}"#);
        assert_eq!(resp["error"]["code"], "E_INVALID_PARAMS");

        let resp = call(&svc, "not json");
        assert_eq!(resp["id"], "unknown");
        assert_eq!(resp["error"]["code"], "E_INVALID_PARAMS");
    }

    #[test]
    fn test_query_and_snapshot() {
        let svc = service();
        let resp = call(&svc, r#"{"id": "q", "method": "query", "params": {"selector": "div.row"}}"#);
        assert_eq!(resp["result"]["count"], 2);

        let resp = call(&svc, r#"{"id": "q2", "method": "query", "params": {"selector": "div[["}}"#);
        assert_eq!(resp["result"]["count"], -1);

        let resp = call(&svc, r#"{"id": "s", "method": "snapshot"}"#);
        assert_eq!(resp["result"]["tree"]["id"], "app");
    }
}
