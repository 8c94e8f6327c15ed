//! Keyword reply classifier.
//!
//! Input is lower-cased and trimmed, then tested against [`RULES`] in order.
//! The first rule that matches wins, so the table order is the precedence
//! order: `"thanks, how much?"` is a price question, not a thank-you.
//! Most rules match on substring containment; the short yes/no rules only
//! match when the whole message is one of their tokens.

use serde::{Deserialize, Serialize};

const BRAND_PLACEHOLDER: &str = "{brand}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Greeting,
    Price,
    Shipping,
    Stock,
    Returns,
    Discount,
    ProductSpec,
    OrderStatus,
    Gratitude,
    Quality,
    Payment,
    Complaint,
    Support,
    Affirmative,
    Negative,
    Default,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Greeting => "greeting",
            Category::Price => "price",
            Category::Shipping => "shipping",
            Category::Stock => "stock",
            Category::Returns => "returns",
            Category::Discount => "discount",
            Category::ProductSpec => "product_spec",
            Category::OrderStatus => "order_status",
            Category::Gratitude => "gratitude",
            Category::Quality => "quality",
            Category::Payment => "payment",
            Category::Complaint => "complaint",
            Category::Support => "support",
            Category::Affirmative => "affirmative",
            Category::Negative => "negative",
            Category::Default => "default",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Trigger {
    /// Any token appears anywhere in the normalized text.
    Contains(&'static [&'static str]),
    /// The normalized text equals one of the tokens.
    Exact(&'static [&'static str]),
}

impl Trigger {
    fn matches(&self, normalized: &str) -> bool {
        match self {
            Trigger::Contains(tokens) => tokens.iter().any(|t| normalized.contains(t)),
            Trigger::Exact(tokens) => tokens.iter().any(|t| normalized == *t),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub category: Category,
    pub trigger: Trigger,
    /// Canned reply; `{brand}` is substituted with the brand name.
    pub reply: &'static str,
}

pub static RULES: &[Rule] = &[
    Rule {
        category: Category::Greeting,
        trigger: Trigger::Contains(&[
            "hi", "hello", "hey", "hola", "good morning", "good evening", "sup", "yo",
        ]),
        reply: "Hi there! 👋 Welcome to {brand}! How can I help you today?",
    },
    Rule {
        category: Category::Price,
        trigger: Trigger::Contains(&[
            "price", "cost", "how much", "$", "expensive", "cheap", "pricing",
        ]),
        reply: "Great question! 💰 All our prices are shown on each post. Looking for something specific?",
    },
    Rule {
        category: Category::Shipping,
        trigger: Trigger::Contains(&[
            "ship", "delivery", "deliver", "arrive", "tracking", "when will", "how long",
        ]),
        reply: "📦 We ship fast! Most orders arrive in 3-5 business days. Need tracking info?",
    },
    Rule {
        category: Category::Stock,
        trigger: Trigger::Contains(&[
            "stock", "available", "in stock", "out of stock", "restock", "sold out",
        ]),
        reply: "We restock regularly! Follow us to stay updated. Want me to check a specific item?",
    },
    Rule {
        category: Category::Returns,
        trigger: Trigger::Contains(&["return", "refund", "exchange", "money back", "cancel"]),
        reply: "No worries! 😊 We have a hassle-free return policy. Share your order number and I'll help!",
    },
    Rule {
        category: Category::Discount,
        trigger: Trigger::Contains(&["discount", "coupon", "promo", "code", "deal", "sale", "offer"]),
        reply: "Love a good deal! 🏷️ Keep an eye on our feed, we drop exclusive promos regularly!",
    },
    Rule {
        category: Category::ProductSpec,
        trigger: Trigger::Contains(&["size", "color", "material", "spec", "detail", "dimension"]),
        reply: "Good question! Check the product post for full specs. Which item are you asking about?",
    },
    Rule {
        category: Category::OrderStatus,
        trigger: Trigger::Contains(&["order", "purchase", "buy", "bought", "ordered"]),
        reply: "Thanks for your order! Check your email for confirmation. Questions about your order?",
    },
    Rule {
        category: Category::Gratitude,
        trigger: Trigger::Contains(&["thank", "thanks", "thx", "ty", "appreciate", "thank you"]),
        reply: "You're welcome! Anything else I can help with? I'm here!",
    },
    Rule {
        category: Category::Quality,
        trigger: Trigger::Contains(&["quality", "good", "worth", "recommend", "review", "rating"]),
        reply: "All our products are carefully selected! Check the ratings on each post. Interested in something specific?",
    },
    Rule {
        category: Category::Payment,
        trigger: Trigger::Contains(&["payment", "pay", "credit card", "paypal", "cash", "venmo"]),
        reply: "We accept all major payment methods! 💳 Secure checkout. Link in bio!",
    },
    Rule {
        category: Category::Complaint,
        trigger: Trigger::Contains(&["problem", "issue", "broken", "damaged", "wrong", "complaint"]),
        reply: "I'm sorry to hear that! 😟 Let me help fix this. Can you share your order number or more details?",
    },
    Rule {
        category: Category::Support,
        trigger: Trigger::Contains(&["contact", "call", "email", "support", "help", "customer service"]),
        reply: "You've reached the right place! 💬 I'm here to help. What do you need assistance with?",
    },
    Rule {
        category: Category::Affirmative,
        trigger: Trigger::Exact(&["yes", "yeah", "yep", "yup", "ok", "okay", "sure", "k"]),
        reply: "Great! How can I assist you further? 😊",
    },
    Rule {
        category: Category::Negative,
        trigger: Trigger::Exact(&["no", "nope", "nah", "not really"]),
        reply: "No problem! Let me know if you change your mind or need anything else. 👍",
    },
];

const DEFAULT_REPLY: &str = "Hey! 👋 Thanks for reaching out to {brand}. How can I help you today?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub reply: String,
}

/// First matching category for `text`, [`Category::Default`] if none match.
pub fn categorize(text: &str) -> Category {
    find_rule(&normalize(text))
        .map(|r| r.category)
        .unwrap_or(Category::Default)
}

/// Category plus the rendered reply.
pub fn classify_detailed(text: &str, brand_name: &str) -> Classification {
    let normalized = normalize(text);
    let (category, template) = match find_rule(&normalized) {
        Some(rule) => (rule.category, rule.reply),
        None => (Category::Default, DEFAULT_REPLY),
    };
    Classification {
        category,
        reply: template.replace(BRAND_PLACEHOLDER, brand_name),
    }
}

pub fn classify(text: &str, brand_name: &str) -> String {
    classify_detailed(text, brand_name).reply
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn find_rule(normalized: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.trigger.matches(normalized))
}
