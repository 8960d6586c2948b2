#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use wsbridge_core::protocol::Framing;
use wsbridge_gateway::config::{self, OriginPolicy};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
session:
  close_timout_ms: 500 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.gateway.path, "/sqls");
    assert_eq!(cfg.gateway.listen, "0.0.0.0:8091");
    assert_eq!(cfg.gateway.origin, OriginPolicy::Any);
    assert_eq!(cfg.session.close_timeout(), Duration::from_secs(1));
    assert_eq!(cfg.session.dispatch_timeout(), None);
    assert_eq!(cfg.session.framing, Framing::Plain);
}

#[test]
fn full_config() {
    let ok = r#"
version: 1
gateway:
  listen: "127.0.0.1:9000"
  path: "/lsp"
  metrics_path: null
  origin:
    allow: ["http://localhost:3000"]
session:
  close_timeout_ms: 250
  dispatch_timeout_ms: 30000
  framing: content_length
  trace: true
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.gateway.metrics_path, None);
    assert_eq!(
        cfg.gateway.origin,
        OriginPolicy::Allow(vec!["http://localhost:3000".into()])
    );
    assert_eq!(cfg.session.dispatch_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(cfg.session.framing, Framing::ContentLength);
    assert!(cfg.session.trace);
}

#[test]
fn origin_any_scalar_form() {
    let cfg = config::load_from_str("gateway:\n  origin: any\n").expect("must parse");
    assert_eq!(cfg.gateway.origin, OriginPolicy::Any);

    let err = config::load_from_str("gateway:\n  origin: everyone\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_REQUEST");
}

#[test]
fn rejects_out_of_range_values() {
    let cases = [
        "version: 2\n",
        "gateway: { listen: \"not-an-addr\" }\n",
        "gateway: { path: \"sqls\" }\n",
        "gateway: { path: \"/x\", metrics_path: \"/x\" }\n",
        "gateway: { origin: { allow: [] } }\n",
        "session: { close_timeout_ms: 0 }\n",
        "session: { dispatch_timeout_ms: 5 }\n",
        "session: { max_frame_bytes: 10 }\n",
        "session: { outbound_queue: 0 }\n",
        "session: { framing: lines }\n",
    ];
    for yaml in cases {
        let err = config::load_from_str(yaml).expect_err(yaml);
        assert_eq!(err.code().as_str(), "INVALID_REQUEST", "yaml={yaml}");
    }
}

#[test]
fn missing_default_file_yields_defaults() {
    let dir = std::env::temp_dir().join("wsbridge-config-test-missing");
    let cfg = config::load_or_default(dir.join("nope.yml")).expect("defaults");
    assert_eq!(cfg.version, 1);
}
