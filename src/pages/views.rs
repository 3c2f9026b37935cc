//! Plain HTML for the server-rendered pages.

use std::fmt::Write;

use crate::{
    auth::repo_types::User,
    records::repo_types::{Action, Analysis},
    session::Flash,
};

const TITLE: &str = "CRITICAL ACTION ANALYZER";

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(heading: &str, flashes: &[Flash], body: &str) -> String {
    let mut notices = String::new();
    for f in flashes {
        let level = serde_json::to_value(f.level)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let _ = write!(
            notices,
            r#"<div class="flash flash-{}">{}</div>"#,
            level,
            escape(&f.message)
        );
    }
    format!(
        r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>{heading} · {TITLE}</title></head>
<body>
<header><a href="/">{TITLE}</a></header>
{notices}
<main>
{body}
</main>
</body>
</html>"#,
        heading = escape(heading),
    )
}

fn inline_error(error: Option<&str>) -> String {
    error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape(e)))
        .unwrap_or_default()
}

pub fn index_page(flashes: &[Flash]) -> String {
    layout(
        "Welcome",
        flashes,
        r#"<h1>Record and analyze critical actions</h1>
<p><a href="/login">Log in</a> or <a href="/signup">create an account</a>.</p>"#,
    )
}

pub fn login_page(flashes: &[Flash], error: Option<&str>, email: &str) -> String {
    let body = format!(
        r#"<h1>Log in</h1>
{error}
<form method="post" action="/login">
  <label>Email or username <input name="email" value="{email}" required></label>
  <label>Password <input name="password" type="password" required></label>
  <button type="submit">Log in</button>
</form>
<p>No account? <a href="/signup">Sign up</a></p>"#,
        error = inline_error(error),
        email = escape(email),
    );
    layout("Log in", flashes, &body)
}

pub fn signup_page(flashes: &[Flash], error: Option<&str>, username: &str, email: &str) -> String {
    let body = format!(
        r#"<h1>Sign up</h1>
{error}
<form method="post" action="/signup">
  <label>Username <input name="username" value="{username}" required></label>
  <label>Email <input name="email" type="email" value="{email}" required></label>
  <label>Password <input name="password" type="password" minlength="6" required></label>
  <label>Confirm password <input name="confirm_password" type="password" minlength="6" required></label>
  <button type="submit">Create account</button>
</form>
<p>Already registered? <a href="/login">Log in</a></p>"#,
        error = inline_error(error),
        username = escape(username),
        email = escape(email),
    );
    layout("Sign up", flashes, &body)
}

pub fn dashboard_page(
    flashes: &[Flash],
    user: &User,
    actions: &[Action],
    analyses: &[Analysis],
) -> String {
    let mut body = format!(
        r#"<h1>Welcome, {}</h1>
<nav><a href="/settings">Settings</a> · <a href="/logout">Log out</a></nav>
<h2>Recent actions</h2>
"#,
        escape(&user.username)
    );

    if actions.is_empty() {
        body.push_str("<p>No actions recorded yet.</p>\n");
    } else {
        body.push_str("<ul class=\"actions\">\n");
        for a in actions {
            let _ = writeln!(
                body,
                "<li><strong>{}</strong> {} <time>{}</time></li>",
                escape(&a.action_type),
                escape(&a.description),
                a.timestamp
            );
        }
        body.push_str("</ul>\n");
    }

    body.push_str("<h2>Recent analyses</h2>\n");
    if analyses.is_empty() {
        body.push_str("<p>No analyses yet.</p>\n");
    } else {
        body.push_str("<ul class=\"analyses\">\n");
        for a in analyses {
            let _ = writeln!(
                body,
                "<li><strong>{}</strong> <code>{}</code> <time>{}</time></li>",
                escape(&a.analysis_type),
                escape(&a.results.to_string()),
                a.timestamp
            );
        }
        body.push_str("</ul>\n");
    }

    layout("Dashboard", flashes, &body)
}

pub fn settings_page(flashes: &[Flash], user: &User) -> String {
    let last_login = user
        .last_login
        .map(|t| t.to_string())
        .unwrap_or_else(|| "never".into());
    let body = format!(
        r#"<h1>Settings</h1>
<dl>
  <dt>Username</dt><dd>{username}</dd>
  <dt>Email</dt><dd>{email}</dd>
  <dt>Member since</dt><dd>{created}</dd>
  <dt>Last login</dt><dd>{last_login}</dd>
</dl>
<h2>Preferences</h2>
<pre>{prefs}</pre>
<p><a href="/dashboard">Back to dashboard</a></p>"#,
        username = escape(&user.username),
        email = escape(&user.email),
        created = user.created_at,
        last_login = escape(&last_login),
        prefs = escape(
            &serde_json::to_string_pretty(&user.preferences).unwrap_or_default()
        ),
    );
    layout("Settings", flashes, &body)
}

pub fn error_page(message: &str) -> String {
    layout(
        "Error",
        &[],
        &format!(r#"<h1>Error</h1><p>{}</p>"#, escape(message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FlashLevel;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<b a="1">&'"#), "&lt;b a=&quot;1&quot;&gt;&amp;&#x27;");
    }

    #[test]
    fn flashes_and_inline_errors_render_escaped() {
        let flashes = vec![Flash {
            level: FlashLevel::Warning,
            message: "<script>".into(),
        }];
        let html = login_page(&flashes, Some("Invalid email or password"), "a@x.com");
        assert!(html.contains(r#"class="flash flash-warning">&lt;script&gt;"#));
        assert!(html.contains("Invalid email or password"));
        assert!(html.contains(r#"value="a@x.com""#));
    }
}
