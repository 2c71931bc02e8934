// ABOUTME: Renders the fixed ASX playlist fallback served to plain-browser requests

/// Renders the one fixed-shape ASX fragment pointing a player at `href`.
/// A templating crate would be overkill for a single known fragment.
pub fn render(href: &str) -> String {
    format!(
        "<asx version=\"3.0\">\n  <entry>\n    <ref href=\"{href}\" />\n  </entry>\n</asx>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_fixed_template() {
        let body = render("mms://cdn.example:9000/live");
        assert_eq!(
            body,
            "<asx version=\"3.0\">\n  <entry>\n    <ref href=\"mms://cdn.example:9000/live\" />\n  </entry>\n</asx>\n"
        );
    }
}
