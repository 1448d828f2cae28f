//! Page-side scripts and inline documents

use url::Url;

use crate::consts::HISTORY_HOOK_FLAG;

/// Script that steps the page's own history back
pub const PAGE_BACK_SCRIPT: &str = "try { history.back(); } catch (e) {}";

/// History instrumentation, injected after every completed load.
///
/// - guarded by a page-global flag, so re-injection on the same page is a no-op
/// - captures `history.length` at first run as the baseline
/// - wraps `pushState`/`replaceState` and listens to `popstate`
/// - posts `hist:<len>:<initLen>` (and `loc:<href>`) on every change,
///   plus once at time zero
/// - never throws, even with no host bridge present
pub fn history_hook_script() -> String {
    format!(
        r#"(function() {{
  try {{
    if (window.{flag}) return;
    window.{flag} = true;
    var initLen = history.length;
    function post(msg) {{
      try {{ if (window.Unity && Unity.call) {{ Unity.call(msg); return; }} }} catch (e) {{}}
      try {{ if (window.ipc && window.ipc.postMessage) {{ window.ipc.postMessage(msg); return; }} }} catch (e) {{}}
      try {{ if (window.parent && window.parent !== window) {{ window.parent.postMessage(msg, '*'); }} }} catch (e) {{}}
    }}
    function notify() {{
      try {{ post('hist:' + history.length + ':' + initLen); }} catch (e) {{}}
      try {{ post('loc:' + location.href); }} catch (e) {{}}
    }}
    function wrap(name) {{
      try {{
        var original = history[name];
        if (typeof original !== 'function') return;
        history[name] = function() {{
          var result = original.apply(this, arguments);
          notify();
          return result;
        }};
      }} catch (e) {{}}
    }}
    wrap('pushState');
    wrap('replaceState');
    window.addEventListener('popstate', notify);
    setTimeout(notify, 0);
  }} catch (e) {{}}
}})();"#,
        flag = HISTORY_HOOK_FLAG
    )
}

/// Inline document that warms DNS/TLS for the target origin, then replaces
/// itself with the real URL after a short fixed delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconnectShim {
    pub html: String,
    pub origin: String,
}

impl PreconnectShim {
    /// `None` if `url` has no host; load it directly instead
    pub fn for_url(url: &str, redirect_delay_ms: u32) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_owned();
        let origin = parsed.origin().ascii_serialization();
        // JSON string literal is a valid JS string; `</` must not close the tag
        let target = serde_json::to_string(url).ok()?.replace("</", "<\\/");
        let html = format!(
            "<!doctype html><meta charset=utf-8>\n\
             <meta http-equiv='x-dns-prefetch-control' content='on'>\n\
             <link rel='preconnect' href='{origin}' crossorigin>\n\
             <link rel='dns-prefetch' href='//{host}'>\n\
             <script>setTimeout(function(){{ location.replace({target}); }}, {redirect_delay_ms});</script>"
        );
        Some(Self { html, origin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_script_is_guarded() {
        let script = history_hook_script();
        assert!(script.contains("if (window.__hoopHistoryHook) return;"));
        assert!(script.contains("window.__hoopHistoryHook = true;"));
    }

    #[test]
    fn test_hook_script_covers_all_triggers() {
        let script = history_hook_script();
        assert!(script.contains("wrap('pushState')"));
        assert!(script.contains("wrap('replaceState')"));
        assert!(script.contains("addEventListener('popstate'"));
        assert!(script.contains("setTimeout(notify, 0)"));
        assert!(script.contains("'hist:' + history.length + ':' + initLen"));
        assert!(script.contains("'loc:' + location.href"));
    }

    #[test]
    fn test_hook_script_braces_balance() {
        let script = history_hook_script();
        let open = script.matches('{').count();
        let close = script.matches('}').count();
        assert_eq!(open, close);
    }

    #[test]
    fn test_preconnect_shim() {
        let shim = PreconnectShim::for_url("https://game.example:8443/play?x=1", 50).unwrap();
        assert_eq!(shim.origin, "https://game.example:8443");
        assert!(shim.html.contains("href='https://game.example:8443' crossorigin"));
        assert!(shim.html.contains("href='//game.example'"));
        assert!(
            shim.html
                .contains("location.replace(\"https://game.example:8443/play?x=1\"); }, 50)")
        );
    }

    #[test]
    fn test_preconnect_shim_escapes_target() {
        let shim = PreconnectShim::for_url("https://game.example/a'b</script>", 50).unwrap();
        assert!(!shim.html.contains("a'b</script>\""));
        assert_eq!(shim.html.matches("</script>").count(), 1);
    }

    #[test]
    fn test_preconnect_shim_needs_host() {
        assert_eq!(PreconnectShim::for_url("not a url", 50), None);
        assert_eq!(PreconnectShim::for_url("data:text/html,hi", 50), None);
    }
}
