use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "scan": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "wordlist": { "type": "string" },
                    "threads": { "type": "integer", "minimum": 1, "maximum": 10 },
                    "delay_secs": { "type": "number", "minimum": 0 },
                    "output": { "type": "string" },
                    "server": { "type": "string", "pattern": "^https?://" },
                    "retry_attempts": { "type": "integer", "minimum": 1 }
                }
            },
            "browser": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "webdriver_url": { "type": "string", "pattern": "^https?://" },
                    "browser": { "type": "string", "enum": ["firefox", "chrome"] },
                    "headless": { "type": "boolean" },
                    "page_load_timeout_secs": { "type": "integer", "minimum": 1 },
                    "settle_ms": { "type": "integer", "minimum": 0 }
                }
            },
            "listener": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "host": { "type": "string" },
                    "port": { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "wordlist": { "type": "string" },
                    "result_file": { "type": "string" },
                    "ctf_mode": { "type": "boolean" },
                    "max_hits": { "type": "integer", "minimum": 1 },
                    "redirect_port": { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "scheme": { "type": "string", "enum": ["http", "https"] }
                }
            }
        }
    })
});
