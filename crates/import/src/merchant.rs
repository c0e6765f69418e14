use std::sync::OnceLock;

use regex::Regex;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_whitespace, r"\s+");
re!(re_processor_prefix,
    r"^(?:POS PURCHASE |POS |DEBIT CARD PURCHASE |CHECKCARD \d{4} |SQ ?\*|TST ?\* ?|PAYPAL ?\*|PP ?\*)");
// One trailing reference token: store numbers, card-processor suffixes,
// posting dates and masked account numbers.
re!(re_trailing_ref,
    r"(?:\s+#\s*[A-Z0-9-]+|\s+[A-Z]*\d[A-Z0-9]*|\*[A-Z0-9]*\d[A-Z0-9]*|\s+\d{1,2}/\d{1,2}(?:/\d{2,4})?|\s+X+\d+)$");
re!(re_trailing_punct, r"[\s#*\-.,/]+$");

/// Canonical merchant name for a raw statement description, e.g.
/// `"TRADER JOE'S #706"` → `"TRADER JOE'S"`.
pub fn normalize_merchant(description: &str) -> String {
    let base = re_whitespace()
        .replace_all(description.trim(), " ")
        .to_uppercase();

    let mut s = re_processor_prefix().replace(&base, "").trim().to_string();
    loop {
        let next = re_trailing_ref().replace(&s, "");
        let next = re_trailing_punct().replace(&next, "").into_owned();
        if next == s {
            break;
        }
        s = next;
    }

    if s.is_empty() {
        base
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_store_number() {
        assert_eq!(normalize_merchant("TRADER JOE'S #706"), "TRADER JOE'S");
        assert_eq!(normalize_merchant("Safeway # 1234"), "SAFEWAY");
    }

    #[test]
    fn keeps_domain_style_names() {
        assert_eq!(normalize_merchant("NETFLIX.COM"), "NETFLIX.COM");
    }

    #[test]
    fn strips_processor_prefix_and_suffix() {
        assert_eq!(normalize_merchant("SQ *BLUE BOTTLE COFFEE 1234"), "BLUE BOTTLE COFFEE");
        assert_eq!(normalize_merchant("AMAZON MKTPL*AB12C3DE"), "AMAZON MKTPL");
        assert_eq!(normalize_merchant("TST* PIZZERIA DELFINA"), "PIZZERIA DELFINA");
    }

    #[test]
    fn strips_repeated_trailing_codes() {
        assert_eq!(normalize_merchant("SHELL OIL 57442 10/02"), "SHELL OIL");
        assert_eq!(normalize_merchant("COMCAST CABLE XXXX1234"), "COMCAST CABLE");
    }

    #[test]
    fn collapses_whitespace_and_uppercases() {
        assert_eq!(normalize_merchant("  whole   foods  market "), "WHOLE FOODS MARKET");
    }

    #[test]
    fn star_without_digits_is_kept() {
        assert_eq!(normalize_merchant("UBER *TRIP"), "UBER *TRIP");
    }

    #[test]
    fn never_empties_a_description() {
        assert_eq!(normalize_merchant("12345"), "12345");
        assert_eq!(normalize_merchant(""), "");
    }

    #[test]
    fn idempotent() {
        for raw in ["TRADER JOE'S #706", "SQ *BLUE BOTTLE COFFEE 1234", "NETFLIX.COM"] {
            let once = normalize_merchant(raw);
            assert_eq!(normalize_merchant(&once), once);
        }
    }
}
