// toolsync/src/mapping/expressions.rs
use regex::Regex;
use std::sync::LazyLock;

// "0.375", "-1.5", "3/8", "10 / 4" with an optional trailing unit
static NUMBER_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d+(?:\.\d*)?|-?\.\d+)(?:/(\d+(?:\.\d*)?))?(?:in|mm)?$")
        .expect("number expression pattern is valid")
});

/// Removes every single and double quote character.
pub fn strip_quotes(text: &str) -> String {
    text.chars().filter(|c| *c != '"' && *c != '\'').collect()
}

/// Reads a numeric expression such as `0.375 in`, `'10 mm'` or `3/8in`.
/// Anything beyond a literal or a single fraction yields `None`.
pub fn parse_expression_number(text: &str) -> Option<f64> {
    let compact: String = strip_quotes(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let caps = NUMBER_EXPRESSION.captures(&compact)?;

    let numerator: f64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2) {
        Some(denominator) => {
            let denominator: f64 = denominator.as_str().parse().ok()?;
            if denominator == 0.0 {
                return None;
            }
            Some(numerator / denominator)
        }
        None => Some(numerator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("'Harvey'"), "Harvey");
        assert_eq!(strip_quotes("\"3/8\" end mill"), "3/8 end mill");
        assert_eq!(strip_quotes("plain"), "plain");
    }

    #[test]
    fn test_parse_expression_number() {
        assert_eq!(parse_expression_number("0.375 in"), Some(0.375));
        assert_eq!(parse_expression_number("'10 mm'"), Some(10.0));
        assert_eq!(parse_expression_number("3/8in"), Some(0.375));
        assert_eq!(parse_expression_number("4"), Some(4.0));
        assert_eq!(parse_expression_number(".5 in"), Some(0.5));
    }

    #[test]
    fn test_parse_expression_number_rejects_formulas() {
        assert_eq!(parse_expression_number("tool_diameter * 3"), None);
        assert_eq!(parse_expression_number("1/0"), None);
        assert_eq!(parse_expression_number(""), None);
        assert_eq!(parse_expression_number("2 ft"), None);
    }
}
