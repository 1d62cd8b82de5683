//! Wire and domain types shared by the API wrappers and the assistant session

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Who authored a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the `type` field of a chat frame (`"user"`, `"ai"`, `"assistant"`)
    #[must_use]
    pub fn from_frame_type(kind: Option<&str>) -> Self {
        match kind.map(str::to_ascii_lowercase).as_deref() {
            Some("user") => Self::User,
            _ => Self::Assistant,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

impl Message {
    /// Create a message stamped with the current time
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(Role::User, text, session_id)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text, session_id)
    }
}

/// Chat-message-shaped frame used by the realtime channel and conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ChatFrame {
    /// Convert into a transcript message
    ///
    /// Falls back to `session_id` when the frame carries none and to the
    /// current time when the timestamp is missing or unparseable.
    #[must_use]
    pub fn into_message(self, session_id: &str) -> Message {
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map_or_else(Utc::now, |t| t.with_timezone(&Utc));

        Message {
            role: Role::from_frame_type(self.kind.as_deref()),
            text: self.message,
            timestamp,
            session_id: if self.session_id.is_empty() {
                session_id.to_string()
            } else {
                self.session_id
            },
        }
    }
}

/// Outbound chat request, also the realtime outbound frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    pub timestamp: String,
}

impl ChatRequest {
    /// Build a request stamped with the current time
    #[must_use]
    pub fn new(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Intent kinds that trigger a product suggestions fetch
const PRODUCT_SEARCH_KINDS: &[&str] = &[
    "product_search",
    "search",
    "search_products",
    "product_inquiry",
];

/// Assistant classification of a message's purpose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "IntentRepr")]
pub struct Intent {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<serde_json::Value>,
}

impl Intent {
    /// Intent with only a kind
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            confidence: None,
            entities: Vec::new(),
        }
    }

    /// Whether this intent asks for product suggestions
    #[must_use]
    pub fn is_product_search(&self) -> bool {
        let kind = self.kind.trim().to_ascii_lowercase();
        PRODUCT_SEARCH_KINDS.contains(&kind.as_str())
    }
}

/// The chat endpoint sends intents either as a bare string or as an object
#[derive(Deserialize)]
#[serde(untagged)]
enum IntentRepr {
    Kind(String),
    Full {
        #[serde(alias = "intent", alias = "type")]
        kind: String,
        #[serde(default)]
        confidence: Option<f64>,
        #[serde(default)]
        entities: Vec<serde_json::Value>,
    },
}

impl From<IntentRepr> for Intent {
    fn from(repr: IntentRepr) -> Self {
        match repr {
            IntentRepr::Kind(kind) => Self::new(kind),
            IntentRepr::Full {
                kind,
                confidence,
                entities,
            } => Self {
                kind,
                confidence,
                entities,
            },
        }
    }
}

/// Reply from the chat and voice endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub intent: Option<Intent>,
    /// Structured preferences extracted by the assistant
    #[serde(default, deserialize_with = "lenient_strings")]
    pub suggestions: Option<Vec<String>>,
}

impl ChatReply {
    /// Whether the reply asks for a follow-up suggestions fetch
    #[must_use]
    pub fn wants_suggestions(&self) -> bool {
        self.intent.as_ref().is_some_and(Intent::is_product_search)
    }
}

/// Accept a list of arbitrary JSON values, keeping strings as-is and
/// rendering everything else as compact JSON
fn lenient_strings<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(values.map(|values| {
        values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect()
    }))
}

/// Result of the standalone intent analysis endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntentAnalysis {
    pub intent: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub entities: Vec<serde_json::Value>,
}

impl From<IntentAnalysis> for Intent {
    fn from(analysis: IntentAnalysis) -> Self {
        Self {
            kind: analysis.intent,
            confidence: Some(analysis.confidence),
            entities: analysis.entities,
        }
    }
}

/// Inclusive price bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// Criteria for the product suggestions endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_preferences: Option<Vec<String>>,
}

impl SuggestionCriteria {
    /// Criteria for a free-text query with optional preferences
    #[must_use]
    pub fn for_query(query: impl Into<String>, preferences: Option<Vec<String>>) -> Self {
        Self {
            search_query: Some(query.into()),
            user_preferences: preferences.filter(|p| !p.is_empty()),
            ..Self::default()
        }
    }
}

/// Catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub seller_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifications: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

const fn default_true() -> bool {
    true
}

/// Partial product used for create and update calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
}

/// Catalog category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Filters for the product listing endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<i64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub brand: Option<String>,
    pub condition: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductQuery {
    /// Query-string pairs for the set filters, in a stable order
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(v) = &self.search {
            pairs.push(("search", v.clone()));
        }
        if let Some(v) = self.category {
            pairs.push(("category", v.to_string()));
        }
        if let Some(v) = self.min_price {
            pairs.push(("min_price", v.to_string()));
        }
        if let Some(v) = self.max_price {
            pairs.push(("max_price", v.to_string()));
        }
        if let Some(v) = &self.brand {
            pairs.push(("brand", v.clone()));
        }
        if let Some(v) = &self.condition {
            pairs.push(("condition", v.clone()));
        }
        if let Some(v) = self.page {
            pairs.push(("page", v.to_string()));
        }
        if let Some(v) = self.limit {
            pairs.push(("limit", v.to_string()));
        }
        pairs
    }
}

/// Envelope returned by product listing endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct ProductsEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub total_found: Option<u64>,
}

/// Envelope returned by the product detail endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct ProductEnvelope {
    #[serde(default)]
    pub success: bool,
    pub product: Product,
}

/// Envelope returned by the categories endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct CategoriesEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// Marketplace account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Buyer,
    Seller,
    Admin,
}

/// Marketplace account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
}

/// Response of the login endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// Account registration payload
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub role: UserRole,
}

/// Stored conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: i64,
    pub session_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub messages: Vec<ChatFrame>,
}

/// Listing suggested by the seller image analysis endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SuggestedListing {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggested_price: f64,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub specifications: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub suggested_category: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

/// Response of the seller image analysis endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageAnalysis {
    #[serde(default)]
    pub success: bool,
    pub suggested_product: SuggestedListing,
    #[serde(default)]
    pub message: String,
}

/// Response of the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}
