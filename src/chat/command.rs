use once_cell::sync::Lazy;
use regex::Regex;

/// Interactive reply ids the bot hands out on its buttons. Replies echo these
/// back verbatim.
pub const ID_VIEW_PRODUCTS: &str = "view_products";
pub const ID_TRACK_ORDER: &str = "track_order";
pub const ID_CONTACT_INFO: &str = "contact_info";
pub const ID_PRODUCT_PREFIX: &str = "product_";

static BUY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^acheter\s+(\d+)$").expect("buy pattern is valid"));

/// One recognised chat action. Produced by the pure parsing functions below
/// and matched exhaustively by the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Greeting word: send the welcome message
    Greeting,
    /// Show the sellable catalog
    Menu,
    /// Show the sender's recent orders
    MyOrders,
    /// Buy one unit of the given product id
    Buy(i64),
    /// Show contact information
    Contact,
    /// Anything unrecognised: send help text
    Help,
}

impl Command {
    /// Parses a free-text message. Matching is case-insensitive on the
    /// trimmed text.
    pub fn parse(text: &str) -> Command {
        let normalized = text.trim().to_lowercase();

        match normalized.as_str() {
            "bonjour" | "bonsoir" | "salut" | "coucou" | "hello" | "hi" => {
                return Command::Greeting
            }
            "menu" | "produits" | "catalogue" => return Command::Menu,
            "commande" | "commandes" | "panier" => return Command::MyOrders,
            "contact" => return Command::Contact,
            _ => {}
        }

        if let Some(captures) = BUY_RE.captures(&normalized) {
            if let Ok(product_id) = captures[1].parse::<i64>() {
                return Command::Buy(product_id);
            }
        }

        Command::Help
    }

    /// Maps an interactive button/list reply id to its action.
    pub fn from_interactive_id(id: &str) -> Command {
        match id {
            ID_VIEW_PRODUCTS => Command::Menu,
            ID_TRACK_ORDER => Command::MyOrders,
            ID_CONTACT_INFO => Command::Contact,
            _ => match id.strip_prefix(ID_PRODUCT_PREFIX) {
                Some(suffix) => suffix
                    .parse::<i64>()
                    .map(Command::Buy)
                    .unwrap_or(Command::Help),
                None => Command::Help,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("bonjour", Command::Greeting)]
    #[test_case("  Bonjour  ", Command::Greeting; "bonjour with whitespace")]
    #[test_case("SALUT", Command::Greeting)]
    #[test_case("menu", Command::Menu)]
    #[test_case("Produits", Command::Menu)]
    #[test_case("catalogue", Command::Menu)]
    #[test_case("commande", Command::MyOrders)]
    #[test_case("commandes", Command::MyOrders)]
    #[test_case("panier", Command::MyOrders)]
    #[test_case("contact", Command::Contact)]
    #[test_case("acheter 12", Command::Buy(12))]
    #[test_case("ACHETER   7", Command::Buy(7))]
    #[test_case("acheter", Command::Help; "buy without id")]
    #[test_case("acheter douze", Command::Help; "buy with words")]
    #[test_case("acheter 1 2", Command::Help; "buy with two ids")]
    #[test_case("qu'est-ce que vous vendez ?", Command::Help)]
    #[test_case("", Command::Help; "empty text")]
    fn parse_text(input: &str, expected: Command) {
        assert_eq!(Command::parse(input), expected);
    }

    #[test_case("view_products", Command::Menu)]
    #[test_case("track_order", Command::MyOrders)]
    #[test_case("contact_info", Command::Contact)]
    #[test_case("product_42", Command::Buy(42))]
    #[test_case("product_x", Command::Help; "product with bad id")]
    #[test_case("something_else", Command::Help)]
    fn parse_interactive(id: &str, expected: Command) {
        assert_eq!(Command::from_interactive_id(id), expected);
    }
}
