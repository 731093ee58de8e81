//! Category rule set: declarative, weighted keyword tables.
//!
//! A category is pure data — an id, display metadata, and an ordered list of
//! `(term, weight)` matchers. Adding a category never touches the matching
//! algorithm. The built-in set below covers the OHPM ecosystem; an
//! alternative set can be loaded from a TOML file.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use ohpmatlas_shared::{AtlasError, FALLBACK_CATEGORY_ID, Result};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// One weighted matcher term. `term` may be a single token or a multi-word
/// phrase; `weight` scales every strategy's contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

/// Static category definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Stable kebab-case identifier.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Emoji label for rendered listings.
    pub icon: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Ordered weighted matcher terms.
    pub terms: Vec<TermWeight>,
}

impl Category {
    /// Sum of all term weights (the scale factor for score normalization).
    pub fn total_weight(&self) -> f64 {
        self.terms.iter().map(|t| t.weight).sum()
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Schema of a rule-set TOML file: a list of `[[categories]]` tables.
#[derive(Debug, Deserialize)]
struct RuleSetFile {
    categories: Vec<Category>,
}

/// A validated, id-sorted collection of categories.
///
/// Iteration order is lexicographic by category id, so re-runs over the same
/// data evaluate categories in the same order and produce diff-stable output.
#[derive(Debug, Clone)]
pub struct RuleSet {
    categories: Vec<Category>,
}

impl RuleSet {
    /// Build a rule set from explicit categories, validating and sorting.
    pub fn from_categories(mut categories: Vec<Category>) -> Result<Self> {
        if categories.is_empty() {
            return Err(AtlasError::validation("rule set has no categories"));
        }

        let mut seen: HashSet<String> = HashSet::with_capacity(categories.len());
        for category in &mut categories {
            if category.id.trim().is_empty() {
                return Err(AtlasError::validation("category with empty id"));
            }
            if category.id == FALLBACK_CATEGORY_ID {
                return Err(AtlasError::validation(format!(
                    "category id `{FALLBACK_CATEGORY_ID}` is reserved for the fallback bucket"
                )));
            }
            if !seen.insert(category.id.clone()) {
                return Err(AtlasError::validation(format!(
                    "duplicate category id `{}`",
                    category.id
                )));
            }
            if category.terms.is_empty() {
                return Err(AtlasError::validation(format!(
                    "category `{}` has no terms",
                    category.id
                )));
            }
            for tw in &mut category.terms {
                tw.term = tw.term.trim().to_lowercase();
                if tw.term.is_empty() {
                    return Err(AtlasError::validation(format!(
                        "category `{}` has an empty term",
                        category.id
                    )));
                }
                if tw.weight <= 0.0 {
                    return Err(AtlasError::validation(format!(
                        "category `{}` term `{}` has non-positive weight",
                        category.id, tw.term
                    )));
                }
            }
        }

        categories.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Self { categories })
    }

    /// Parse a rule set from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RuleSetFile = toml::from_str(content)
            .map_err(|e| AtlasError::validation(format!("invalid rule set: {e}")))?;
        Self::from_categories(file.categories)
    }

    /// Load a rule set from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| AtlasError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Categories in stable (id-sorted) evaluation order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Look up a category by id.
    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Whether the rule set is empty (never true for a validated set).
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// The built-in rule set covering the OHPM ecosystem.
    pub fn builtin() -> Self {
        Self::from_categories(builtin_categories()).expect("built-in rule set is valid")
    }
}

// ---------------------------------------------------------------------------
// Built-in categories
// ---------------------------------------------------------------------------

fn category(
    id: &str,
    display_name: &str,
    icon: &str,
    description: &str,
    terms: &[(&str, f64)],
) -> Category {
    Category {
        id: id.into(),
        display_name: display_name.into(),
        icon: icon.into(),
        description: description.into(),
        terms: terms
            .iter()
            .map(|(term, weight)| TermWeight {
                term: (*term).into(),
                weight: *weight,
            })
            .collect(),
    }
}

fn builtin_categories() -> Vec<Category> {
    vec![
        category(
            "ai-ml",
            "AI & Machine Learning",
            "🤖",
            "Artificial intelligence, machine learning, and smart features",
            &[
                ("ai", 1.0),
                ("machine learning", 1.0),
                ("neural", 0.8),
                ("ocr", 0.8),
                ("nlp", 0.8),
                ("recognition", 0.6),
                ("tensorflow", 0.6),
                ("vision", 0.5),
                ("intelligent", 0.5),
            ],
        ),
        category(
            "animation",
            "Animation & Effects",
            "✨",
            "Animation libraries, visual effects, and motion design",
            &[
                ("animation", 1.0),
                ("animate", 0.8),
                ("lottie", 0.8),
                ("easing", 0.8),
                ("tween", 0.8),
                ("keyframe", 0.8),
                ("transition", 0.6),
                ("motion", 0.5),
            ],
        ),
        category(
            "ar-vr",
            "AR/VR & Immersive",
            "🥽",
            "Augmented reality, virtual reality, and immersive technologies",
            &[
                ("augmented reality", 1.0),
                ("virtual reality", 1.0),
                ("vr", 0.8),
                ("panorama", 0.8),
                ("immersive", 0.8),
                ("ar", 0.6),
                ("spatial", 0.5),
            ],
        ),
        category(
            "communication",
            "Communication & Messaging",
            "💬",
            "Chat, messaging, notifications, and communication tools",
            &[
                ("chat", 1.0),
                ("message", 0.8),
                ("messaging", 0.8),
                ("email", 0.8),
                ("sms", 0.8),
                ("notification", 0.6),
                ("push", 0.5),
                ("call", 0.5),
            ],
        ),
        category(
            "data-storage",
            "Data & Storage",
            "💾",
            "Databases, persistence, caching, and data management",
            &[
                ("database", 1.0),
                ("sqlite", 1.0),
                ("orm", 1.0),
                ("storage", 0.8),
                ("persistence", 0.8),
                ("sql", 0.8),
                ("crud", 0.7),
                ("cache", 0.6),
                ("preference", 0.6),
                ("key value", 0.6),
            ],
        ),
        category(
            "ecommerce-payment",
            "E-commerce & Payment",
            "💰",
            "Payment processing and e-commerce features",
            &[
                ("payment", 1.0),
                ("alipay", 0.9),
                ("wallet", 0.8),
                ("checkout", 0.8),
                ("cart", 0.8),
                ("billing", 0.8),
                ("pay", 0.8),
                ("order", 0.5),
            ],
        ),
        category(
            "education",
            "Education & Learning",
            "📚",
            "Educational apps, courses, and academic tools",
            &[
                ("education", 1.0),
                ("course", 0.8),
                ("quiz", 0.8),
                ("exam", 0.7),
                ("student", 0.7),
                ("learning", 0.6),
                ("tutorial", 0.5),
            ],
        ),
        category(
            "gaming-graphics",
            "Gaming & Graphics",
            "🎮",
            "Game development, rendering, and interactive graphics",
            &[
                ("game", 1.0),
                ("gaming", 1.0),
                ("opengl", 0.9),
                ("shader", 0.9),
                ("sprite", 0.8),
                ("physics engine", 0.8),
                ("3d", 0.7),
                ("render", 0.6),
                ("canvas", 0.5),
            ],
        ),
        category(
            "health-fitness",
            "Health & Fitness",
            "💪",
            "Health monitoring, fitness tracking, and wellness",
            &[
                ("health", 1.0),
                ("fitness", 1.0),
                ("workout", 0.9),
                ("heart rate", 0.9),
                ("medical", 0.8),
                ("calorie", 0.8),
                ("sleep", 0.5),
            ],
        ),
        category(
            "i18n",
            "Internationalization & Localization",
            "🌍",
            "i18n, l10n, and multi-language support",
            &[
                ("i18n", 1.0),
                ("l10n", 1.0),
                ("localization", 1.0),
                ("internationalization", 1.0),
                ("multilingual", 0.9),
                ("translation", 0.8),
                ("locale", 0.8),
                ("timezone", 0.5),
            ],
        ),
        category(
            "iot",
            "IoT & Smart Devices",
            "🏠",
            "Internet of Things, smart home, and connected devices",
            &[
                ("iot", 1.0),
                ("mqtt", 1.0),
                ("smart home", 1.0),
                ("zigbee", 0.9),
                ("modbus", 0.9),
                ("gateway", 0.6),
                ("embedded", 0.5),
            ],
        ),
        category(
            "location-maps",
            "Location & Maps",
            "📍",
            "GPS, maps, and geolocation features",
            &[
                ("location", 1.0),
                ("gps", 1.0),
                ("geolocation", 1.0),
                ("geocoding", 0.9),
                ("map", 0.8),
                ("latitude", 0.8),
                ("longitude", 0.8),
                ("coordinate", 0.6),
                ("navigation", 0.4),
            ],
        ),
        category(
            "media",
            "Media & Multimedia",
            "🎵",
            "Audio, video, image processing, and multimedia handling",
            &[
                ("audio", 1.0),
                ("video", 1.0),
                ("multimedia", 1.0),
                ("codec", 0.9),
                ("camera", 0.8),
                ("music", 0.8),
                ("image", 0.7),
                ("player", 0.7),
                ("photo", 0.7),
                ("gif", 0.6),
            ],
        ),
        category(
            "navigation-routing",
            "Navigation & Routing",
            "🧭",
            "App navigation, routing, and page transitions",
            &[
                ("router", 1.0),
                ("deep link", 0.9),
                ("route", 0.8),
                ("navigation", 0.8),
                ("page stack", 0.7),
                ("drawer", 0.6),
                ("tab", 0.4),
            ],
        ),
        category(
            "networking",
            "Networking & APIs",
            "🌐",
            "HTTP clients, API wrappers, and networking libraries",
            &[
                ("http", 1.0),
                ("websocket", 1.0),
                ("axios", 0.9),
                ("network", 0.8),
                ("rest", 0.8),
                ("rpc", 0.8),
                ("socket", 0.8),
                ("request", 0.5),
                ("api", 0.5),
                ("download", 0.5),
            ],
        ),
        category(
            "productivity",
            "Productivity & Business",
            "📊",
            "Documents, office formats, and business tooling",
            &[
                ("pdf", 0.9),
                ("excel", 0.9),
                ("office", 0.8),
                ("document", 0.7),
                ("workflow", 0.7),
                ("calendar", 0.6),
                ("dashboard", 0.6),
                ("report", 0.5),
                ("chart", 0.5),
            ],
        ),
        category(
            "security",
            "Security & Encryption",
            "🔒",
            "Encryption, authentication, and privacy tools",
            &[
                ("encrypt", 1.0),
                ("decrypt", 1.0),
                ("crypto", 1.0),
                ("cipher", 1.0),
                ("aes", 0.9),
                ("rsa", 0.9),
                ("jwt", 0.8),
                ("oauth", 0.8),
                ("biometric", 0.7),
                ("password", 0.7),
                ("sha", 0.6),
                ("hash", 0.5),
                ("auth", 0.5),
            ],
        ),
        category(
            "sensors-hardware",
            "Sensors & Hardware",
            "📱",
            "Device sensors, hardware interfaces, and system capabilities",
            &[
                ("sensor", 1.0),
                ("bluetooth", 1.0),
                ("nfc", 1.0),
                ("accelerometer", 1.0),
                ("gyroscope", 1.0),
                ("battery", 0.8),
                ("vibration", 0.8),
                ("wifi", 0.7),
                ("fingerprint", 0.6),
            ],
        ),
        category(
            "social-sharing",
            "Social & Sharing",
            "📤",
            "Social media integration and sharing capabilities",
            &[
                ("social", 1.0),
                ("share", 0.9),
                ("sharing", 0.9),
                ("weibo", 0.9),
                ("wechat", 0.8),
                ("qq", 0.7),
                ("follow", 0.5),
                ("comment", 0.4),
            ],
        ),
        category(
            "state-management",
            "State Management",
            "🔄",
            "State containers, reactive data flow, and dependency injection",
            &[
                ("redux", 1.0),
                ("mvvm", 0.9),
                ("viewmodel", 0.9),
                ("dependency injection", 0.9),
                ("reactive", 0.8),
                ("observable", 0.8),
                ("state", 0.8),
                ("store", 0.6),
            ],
        ),
        category(
            "testing",
            "Testing & Quality Assurance",
            "🧪",
            "Testing frameworks, mocks, and quality assurance tools",
            &[
                ("test", 1.0),
                ("testing", 1.0),
                ("unit test", 1.0),
                ("hypium", 1.0),
                ("mock", 0.9),
                ("assertion", 0.9),
                ("coverage", 0.6),
                ("benchmark", 0.6),
            ],
        ),
        category(
            "ui-components",
            "UI Components & Design",
            "🎨",
            "UI components, layout tools, and visual elements",
            &[
                ("ui", 0.8),
                ("dialog", 0.8),
                ("picker", 0.8),
                ("toast", 0.8),
                ("swiper", 0.8),
                ("component", 0.7),
                ("button", 0.7),
                ("layout", 0.7),
                ("banner", 0.7),
                ("refresh", 0.6),
                ("calendar", 0.5),
                ("theme", 0.5),
                ("list", 0.4),
            ],
        ),
        category(
            "utilities",
            "Utilities & Tools",
            "🛠️",
            "Utility libraries, helper functions, and development tools",
            &[
                ("util", 1.0),
                ("utils", 1.0),
                ("toolkit", 0.9),
                ("helper", 0.8),
                ("logger", 0.7),
                ("tool", 0.6),
                ("common", 0.5),
                ("json", 0.5),
                ("convert", 0.5),
                ("log", 0.5),
                ("string", 0.4),
                ("date", 0.4),
                ("format", 0.4),
            ],
        ),
    ]
}
