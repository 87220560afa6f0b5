//! Edge rewrite rule mapping request paths to stored objects.
//!
//! The CDN rewrites every request before it reaches the origin:
//! - a path ending in `/` becomes `<path>index.html`
//! - a path containing no `.` becomes `<path>/index.html`
//! - anything else passes through unchanged
//!
//! Invalidation patterns and verification expectations are both derived
//! from this rule, so it lives in one place.

/// Apply the edge rewrite to a request path.
pub fn rewrite_request_path(path: &str) -> String {
    let path: String = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    if path.ends_with('/') {
        format!("{}index.html", path)
    } else if !path.contains('.') {
        format!("{}/index.html", path)
    } else {
        path
    }
}

/// Relative object path served for a request path (rewrite applied,
/// leading slash removed).
pub fn object_path_for_request(path: &str) -> String {
    rewrite_request_path(path).trim_start_matches('/').to_string()
}

/// Request paths that the rewrite maps onto `relative_path`.
///
/// For `about/index.html` this is `/about`, `/about/` and
/// `/about/index.html`; for a plain file it is just the file's own path.
pub fn request_paths_for(relative_path: &str) -> Vec<String> {
    let relative_path: &str = relative_path.trim_start_matches('/');
    let mut paths: Vec<String> = vec![format!("/{}", relative_path)];

    if let Some(dir) = index_directory(relative_path) {
        if dir.is_empty() {
            paths.push("/".to_string());
        } else {
            paths.push(format!("/{}/", dir));
            if !dir.contains('.') {
                paths.push(format!("/{}", dir));
            }
        }
    }

    paths.sort();
    paths
}

/// Directory of an `index.html` file (`""` for the root one).
pub(crate) fn index_directory(relative_path: &str) -> Option<&str> {
    if relative_path == "index.html" {
        return Some("");
    }
    relative_path.strip_suffix("/index.html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash() {
        assert_eq!(rewrite_request_path("/"), "/index.html");
        assert_eq!(rewrite_request_path("/about/"), "/about/index.html");
    }

    #[test]
    fn test_extensionless() {
        assert_eq!(rewrite_request_path("/about"), "/about/index.html");
        assert_eq!(rewrite_request_path("/blog/post-1"), "/blog/post-1/index.html");
        assert_eq!(rewrite_request_path("pricing"), "/pricing/index.html");
    }

    #[test]
    fn test_dotted_paths_pass_through() {
        assert_eq!(rewrite_request_path("/favicon.ico"), "/favicon.ico");
        assert_eq!(rewrite_request_path("/_next/static/abc.js"), "/_next/static/abc.js");
        assert_eq!(rewrite_request_path("/v1.2/docs"), "/v1.2/docs");
    }

    #[test]
    fn test_object_path_for_request() {
        assert_eq!(object_path_for_request("/"), "index.html");
        assert_eq!(object_path_for_request("/about"), "about/index.html");
        assert_eq!(object_path_for_request("/robots.txt"), "robots.txt");
    }

    #[test]
    fn test_request_paths_for_index_files() {
        assert_eq!(request_paths_for("index.html"), vec!["/", "/index.html"]);
        assert_eq!(
            request_paths_for("about/index.html"),
            vec!["/about", "/about/", "/about/index.html"]
        );
        assert_eq!(
            request_paths_for("v1.2/index.html"),
            vec!["/v1.2/", "/v1.2/index.html"]
        );
    }

    #[test]
    fn test_request_paths_round_trip_through_rewrite() {
        for relative in ["index.html", "about/index.html", "docs/a/b/index.html", "logo.png"] {
            for request in request_paths_for(relative) {
                assert_eq!(object_path_for_request(&request), relative, "{}", request);
            }
        }
    }

    #[test]
    fn test_request_paths_for_plain_file() {
        assert_eq!(request_paths_for("images/logo.png"), vec!["/images/logo.png"]);
        assert_eq!(request_paths_for("about.html"), vec!["/about.html"]);
    }
}
