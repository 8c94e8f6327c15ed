//! Human-facing HTML: the status page and the manual test harness.

use autodm_core::config::AppConfig;
use autodm_core::metrics::MetricsSnapshot;

const STYLE: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
       background: linear-gradient(135deg, #833AB4 0%, #E1306C 50%, #F77737 100%);
       min-height: 100vh; padding: 20px; }
.container { max-width: 860px; margin: 0 auto; background: white; border-radius: 16px;
             padding: 32px; box-shadow: 0 10px 40px rgba(0,0,0,0.2); }
h1 { color: #E1306C; margin-bottom: 8px; }
h2 { color: #333; margin: 24px 0 12px; font-size: 1.2em; }
.status { display: inline-block; background: #d4edda; color: #155724; padding: 6px 14px;
          border-radius: 20px; font-weight: 600; margin-bottom: 16px; }
.grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(160px, 1fr)); gap: 12px; }
.card { background: #f8f9fa; border-radius: 10px; padding: 14px; }
.card .label { color: #666; font-size: 0.85em; }
.card .value { font-size: 1.4em; font-weight: 700; color: #333; }
code { background: #f1f1f1; padding: 2px 6px; border-radius: 4px; }
li { margin: 6px 0 6px 20px; }
button { background: #E1306C; color: white; border: none; padding: 10px 16px; border-radius: 8px;
         cursor: pointer; margin: 4px; font-size: 0.95em; }
button:hover { background: #c13584; }
input { padding: 10px; border: 1px solid #ddd; border-radius: 8px; width: 70%; font-size: 0.95em; }
.result { display: none; margin: 8px 0; padding: 10px; border-radius: 8px; background: #fff3cd; }
.result.show { display: block; }
.result.success { background: #d4edda; }
.result.error { background: #f8d7da; }
@media (max-width: 768px) { h1 { font-size: 1.6em; } input { width: 100%; } }
"#;

const SAMPLE_MESSAGES: &[&str] = &[
    "Hello!",
    "How much does this cost?",
    "When will my order arrive?",
    "Is this in stock?",
    "I want a refund",
    "Any discount codes?",
    "What sizes do you have?",
    "Thanks!",
    "yes",
    "no",
];

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// JSON string literal that is safe to embed inside a `<script>` block.
fn js_string(raw: &str) -> String {
    serde_json::to_string(raw)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c")
}

fn format_uptime(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}

pub fn status_page(config: &AppConfig, metrics: &MetricsSnapshot) -> String {
    let brand = escape_html(&config.brand_name);
    let account = escape_html(&config.account_id);
    let version = escape_html(&config.api_version);
    let endpoint = escape_html(&config.messages_endpoint());
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Instagram Auto DM - {brand}</title>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<style>{style}</style>
</head>
<body>
<div class="container">
  <h1>Instagram Auto DM</h1>
  <div class="status">Server running</div>
  <div class="grid">
    <div class="card"><div class="label">Brand</div><div class="value">{brand}</div></div>
    <div class="card"><div class="label">Uptime</div><div class="value">{uptime}</div></div>
    <div class="card"><div class="label">Received</div><div class="value">{received}</div></div>
    <div class="card"><div class="label">Replies sent</div><div class="value">{sent}</div></div>
    <div class="card"><div class="label">Errors</div><div class="value">{errors}</div></div>
  </div>
  <h2>Configuration</h2>
  <ul>
    <li>Instagram account: <code>{account}</code></li>
    <li>API version: <code>{version}</code></li>
    <li>Messages endpoint: <code>{endpoint}</code></li>
  </ul>
  <h2>Endpoints</h2>
  <ul>
    <li><code>GET /webhook</code> subscription verification</li>
    <li><code>POST /webhook</code> message events</li>
    <li><code>GET /stats</code> <a href="/stats">JSON statistics</a></li>
    <li><code>GET /health</code> health check</li>
    <li><code>GET /test</code> <a href="/test">manual test page</a></li>
  </ul>
</div>
</body>
</html>"#,
        style = STYLE,
        brand = brand,
        uptime = format_uptime(metrics.uptime_secs),
        received = metrics.total_received,
        sent = metrics.total_sent,
        errors = metrics.total_errors,
        account = account,
        version = version,
        endpoint = endpoint,
    )
}

pub fn test_page(config: &AppConfig) -> String {
    let buttons = SAMPLE_MESSAGES
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            format!(
                r#"<div><button onclick="test({msg_js}, 'result-{i}')">{msg_html}</button><div id="result-{i}" class="result"></div></div>"#,
                msg_js = escape_html(&js_string(msg)),
                msg_html = escape_html(msg),
                i = i,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Instagram Auto DM - Test</title>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<style>{style}</style>
</head>
<body>
<div class="container">
  <h1>Test Auto-Replies</h1>
  <p>Simulate incoming messages; replies are logged by the server.</p>
  <h2>Sample messages</h2>
  {buttons}
  <h2>Custom message</h2>
  <input id="custom" placeholder="Type a message...">
  <button onclick="testCustom()">Send</button>
  <div id="result-custom" class="result"></div>
  <h2>Live stats</h2>
  <div id="stats-display">Loading...</div>
  <button onclick="loadStats()">Refresh</button>
</div>
<script>
const ACCOUNT_ID = {account_js};

function buildEvent(prefix, msg) {{
  const now = Date.now();
  return {{
    object: "instagram",
    entry: [{{
      id: ACCOUNT_ID,
      time: Math.floor(now / 1000),
      messaging: [{{
        sender: {{ id: prefix + "_" + now }},
        recipient: {{ id: ACCOUNT_ID }},
        timestamp: now,
        message: {{ mid: "mid." + prefix + "_" + now, text: msg }}
      }}]
    }}]
  }};
}}

function post(event, resultDiv, msg) {{
  resultDiv.className = 'result show';
  resultDiv.textContent = 'Sending...';
  fetch('/webhook', {{
    method: 'POST',
    headers: {{ 'Content-Type': 'application/json' }},
    body: JSON.stringify(event)
  }})
    .then(r => {{
      resultDiv.className = r.ok ? 'result show success' : 'result show error';
      resultDiv.textContent = (r.ok ? 'Sent: ' : 'Error ' + r.status + ': ') + msg;
      loadStats();
    }})
    .catch(err => {{
      resultDiv.className = 'result show error';
      resultDiv.textContent = 'Error: ' + err;
    }});
}}

function test(msg, resultId) {{
  const resultDiv = document.getElementById(resultId);
  if (!resultDiv) return;
  post(buildEvent("test", msg), resultDiv, msg);
}}

function testCustom() {{
  const msg = document.getElementById('custom').value.trim();
  const resultDiv = document.getElementById('result-custom');
  if (!msg) {{
    resultDiv.className = 'result show error';
    resultDiv.textContent = 'Please enter a message';
    return;
  }}
  post(buildEvent("custom", msg), resultDiv, msg);
}}

function loadStats() {{
  fetch('/stats')
    .then(r => r.json())
    .then(data => {{
      const el = document.getElementById('stats-display');
      el.textContent = 'Received: ' + data.stats.total_received +
        ' | Sent: ' + data.stats.total_sent +
        ' | Errors: ' + data.stats.total_errors +
        ' | Conversations: ' + data.conversations +
        ' | Uptime: ' + data.uptime_seconds.toFixed(0) + 's';
    }})
    .catch(err => console.error('Error loading stats:', err));
}}

loadStats();
</script>
</body>
</html>"#,
        style = STYLE,
        buttons = buttons,
        account_js = js_string(&config.account_id),
    )
}
