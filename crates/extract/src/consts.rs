use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Anchors are matched on their exact href in code, since repository names
// would otherwise have to be escaped into a CSS attribute selector.
selector!(ANCHOR_SELECTOR, "a[href]");
selector!(COUNTER_SELECTOR, ".Counter");
// Comma-grouped digits, as rendered next to "Contributors" on overflow.
regex!(GROUPED_DIGITS_REGEX, r"\d[\d,]*");
