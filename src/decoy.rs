//! Decoy document bodies.
//!
//! Ordinary HTTP traffic never learns this process is a tunnel: the root path
//! serves a plausible status panel, the health endpoint answers like any
//! container app, and every other path pretends to be a small JSON API that
//! has no such resource.

use std::time::{SystemTime, UNIX_EPOCH};

/// Static status-panel page served on `/`.
pub const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Server Status</title>
    <style>
        body { background: #000; color: #0f0; font-family: 'Courier New', Courier, monospace; margin: 0; padding: 20px; display: flex; justify-content: center; align-items: center; height: 100vh; }
        .monitor { border: 1px solid #333; padding: 40px; width: 600px; background: #0a0a0a; }
        h1 { border-bottom: 1px solid #333; padding-bottom: 10px; margin-top: 0; font-size: 24px; text-transform: uppercase; letter-spacing: 2px; }
        .grid { display: grid; grid-template-columns: 1fr 1fr; gap: 20px; margin-top: 20px; }
        .label { color: #666; font-size: 12px; }
        .value { font-size: 16px; font-weight: bold; }
        .log { margin-top: 30px; font-size: 12px; color: #555; border-top: 1px solid #222; padding-top: 10px; }
    </style>
</head>
<body>
    <div class="monitor">
        <h1>System Interface</h1>
        <div class="grid">
            <div><div class="label">STATUS</div><div class="value">ONLINE</div></div>
            <div><div class="label">UPTIME</div><div class="value" id="uptime">00:00:00</div></div>
            <div><div class="label">LOAD</div><div class="value">0.12, 0.08, 0.04</div></div>
            <div><div class="label">MEMORY</div><div class="value">256MB / 2048MB</div></div>
        </div>
        <div class="log">
            &gt; Initializing protocols...<br>
            &gt; Loading kernel modules...<br>
            &gt; Connection established.<br>
            &gt; Waiting for data stream...
        </div>
    </div>
    <script>
        let s = 0;
        setInterval(() => {
            s++;
            const h = Math.floor(s / 3600).toString().padStart(2, '0');
            const m = Math.floor((s % 3600) / 60).toString().padStart(2, '0');
            const sec = (s % 60).toString().padStart(2, '0');
            document.getElementById('uptime').innerText = `${h}:${m}:${sec}`;
        }, 1000);
    </script>
</body>
</html>
"#;

/// Body for `/healthz`.
#[must_use]
pub fn health_body() -> String {
    serde_json::json!({ "ok": true }).to_string()
}

/// Body for every unknown path, disguised as an API error.
#[must_use]
pub fn not_found_body() -> String {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    serde_json::json!({
        "code": 404,
        "message": "Resource not found",
        "timestamp": timestamp_ms,
    })
    .to_string()
}
