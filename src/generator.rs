// Fake Data Generator Module
// Instantiates function/tool parameter schemas with plausible pseudo-random
// values. Every value is drawn from the caller's RNG, so the same RNG state and
// schema always yield the same arguments.

use crate::errors::MockError;
use chrono::{DateTime, SecondsFormat};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::{Map, Value};

/// Number of elements generated for every `array` schema
pub const ARRAY_LENGTH: usize = 5;

/// Inclusive upper bound for generated numbers
pub const MAX_NUMBER: i64 = 100;

const LOREM_WORDS: &[&str] = &[
    "lorem",
    "ipsum",
    "dolor",
    "sit",
    "amet",
    "consectetur",
    "adipiscing",
    "elit",
    "sed",
    "do",
    "eiusmod",
    "tempor",
    "incididunt",
    "ut",
    "labore",
    "et",
    "dolore",
    "magna",
    "aliqua",
    "enim",
    "ad",
    "minim",
    "veniam",
    "quis",
    "nostrud",
    "exercitation",
    "ullamco",
    "laboris",
    "nisi",
    "aliquip",
];

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Grace", "Linus", "Margaret", "Dennis", "Barbara", "Ken", "Frances", "Edsger",
    "Radia", "Niklaus", "Hedy", "John", "Katherine", "Tim",
];

const LAST_NAMES: &[&str] = &[
    "Lovelace", "Turing", "Hopper", "Torvalds", "Hamilton", "Ritchie", "Liskov", "Thompson",
    "Allen", "Dijkstra", "Perlman", "Wirth", "Lamarr", "McCarthy", "Johnson", "Berners-Lee",
];

const COMPANY_SUFFIXES: &[&str] = &["Inc", "LLC", "Group", "and Sons", "Labs", "Partners"];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net", "mail.test"];

const STREET_NAMES: &[&str] = &[
    "Maple", "Oak", "Cedar", "Elm", "Pine", "Lake", "Hill", "Washington", "Park", "Sunset",
];

const STREET_SUFFIXES: &[&str] = &["Street", "Avenue", "Road", "Lane", "Boulevard", "Drive"];

const CITIES: &[&str] = &[
    "Springfield",
    "Riverside",
    "Fairview",
    "Madison",
    "Georgetown",
    "Ashland",
    "Clinton",
    "Franklin",
];

const JOB_LEVELS: &[&str] = &["Senior", "Junior", "Lead", "Principal", "Chief", "Associate"];

const JOB_AREAS: &[&str] = &[
    "Data",
    "Security",
    "Marketing",
    "Infrastructure",
    "Product",
    "Operations",
];

const JOB_ROLES: &[&str] = &[
    "Engineer",
    "Analyst",
    "Designer",
    "Manager",
    "Consultant",
    "Architect",
];

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "SEK", "NOK", "BRL",
];

const PRODUCT_ADJECTIVES: &[&str] = &[
    "Ergonomic",
    "Rustic",
    "Sleek",
    "Handcrafted",
    "Practical",
    "Refined",
];

const PRODUCT_MATERIALS: &[&str] = &["Steel", "Wooden", "Cotton", "Granite", "Bamboo", "Rubber"];

const PRODUCT_NOUNS: &[&str] = &["Chair", "Keyboard", "Lamp", "Table", "Backpack", "Bottle"];

/// Semantic categories recognised from a property name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Name,
    Email,
    Price,
    Company,
    Phone,
    Address,
    Date,
    JobTitle,
    CreditCardNumber,
    CurrencyCode,
    ProductName,
    Uuid,
}

impl FieldKind {
    /// Ordered so that compound names are checked before their parts
    /// (`productName` before `name`, `jobTitle` before anything shorter).
    const MATCHERS: &'static [(&'static str, FieldKind)] = &[
        ("productname", FieldKind::ProductName),
        ("jobtitle", FieldKind::JobTitle),
        ("creditcardnumber", FieldKind::CreditCardNumber),
        ("currencycode", FieldKind::CurrencyCode),
        ("company", FieldKind::Company),
        ("email", FieldKind::Email),
        ("phone", FieldKind::Phone),
        ("address", FieldKind::Address),
        ("uuid", FieldKind::Uuid),
        ("price", FieldKind::Price),
        ("date", FieldKind::Date),
        ("name", FieldKind::Name),
    ];

    /// Recognise a category from a property name, ignoring case, `_` and `-`
    pub fn from_field_name(field: &str) -> Option<Self> {
        let normalized: String = field
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Self::MATCHERS
            .iter()
            .find(|(needle, _)| normalized.contains(needle))
            .map(|(_, kind)| *kind)
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match self {
            FieldKind::Name => format!("{} {}", pick(FIRST_NAMES, rng), pick(LAST_NAMES, rng)),
            FieldKind::Email => format!(
                "{}.{}@{}",
                pick(FIRST_NAMES, rng).to_lowercase(),
                pick(LAST_NAMES, rng).to_lowercase(),
                pick(EMAIL_DOMAINS, rng)
            ),
            FieldKind::Price => format!("{:.2}", rng.random_range(1.0..1000.0_f64)),
            FieldKind::Company => {
                format!("{} {}", pick(LAST_NAMES, rng), pick(COMPANY_SUFFIXES, rng))
            }
            FieldKind::Phone => format!(
                "({}{}) {}-{}",
                rng.random_range(2..10),
                digits(2, rng),
                digits(3, rng),
                digits(4, rng)
            ),
            FieldKind::Address => format!(
                "{} {} {}, {}",
                rng.random_range(1..10_000),
                pick(STREET_NAMES, rng),
                pick(STREET_SUFFIXES, rng),
                pick(CITIES, rng)
            ),
            FieldKind::Date => random_date(rng),
            FieldKind::JobTitle => format!(
                "{} {} {}",
                pick(JOB_LEVELS, rng),
                pick(JOB_AREAS, rng),
                pick(JOB_ROLES, rng)
            ),
            FieldKind::CreditCardNumber => credit_card_number(rng),
            FieldKind::CurrencyCode => pick(CURRENCY_CODES, rng).to_string(),
            FieldKind::ProductName => format!(
                "{} {} {}",
                pick(PRODUCT_ADJECTIVES, rng),
                pick(PRODUCT_MATERIALS, rng),
                pick(PRODUCT_NOUNS, rng)
            ),
            FieldKind::Uuid => uuid::Builder::from_random_bytes(rng.random())
                .into_uuid()
                .to_string(),
        }
    }
}

fn pick<R: Rng + ?Sized>(pool: &[&'static str], rng: &mut R) -> &'static str {
    pool.choose(rng).copied().unwrap_or_default()
}

fn digits<R: Rng + ?Sized>(count: usize, rng: &mut R) -> String {
    (0..count)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// An RFC 3339 timestamp between 2020-01-01 and the end of 2025
fn random_date<R: Rng + ?Sized>(rng: &mut R) -> String {
    const START: i64 = 1_577_836_800;
    const END: i64 = 1_767_225_599;
    DateTime::from_timestamp(rng.random_range(START..=END), 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Sixteen digits passing the Luhn check, grouped in fours
fn credit_card_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut numbers: Vec<u32> = vec![4];
    numbers.extend((0..14).map(|_| rng.random_range(0..10)));

    // check digit: double every second digit from the right, counting the
    // check digit position as the first
    let sum: u32 = numbers
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                *d
            }
        })
        .sum();
    numbers.push((10 - sum % 10) % 10);

    numbers
        .chunks(4)
        .map(|group| group.iter().map(|d| d.to_string()).collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// A short capitalised prose fragment of three to eight words
pub fn prose_fragment<R: Rng + ?Sized>(rng: &mut R) -> String {
    let count = rng.random_range(3..=8);
    let mut result = String::new();
    for i in 0..count {
        let word = pick(LOREM_WORDS, rng);
        if i == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                result.push(first.to_ascii_uppercase());
                result.extend(chars);
            }
        } else {
            result.push(' ');
            result.push_str(word);
        }
    }
    result.push('.');
    result
}

/// Schema-driven fake data generator over a borrowed RNG
pub struct FakeDataGenerator<'r, R: Rng + ?Sized> {
    rng: &'r mut R,
}

impl<'r, R: Rng + ?Sized> FakeDataGenerator<'r, R> {
    pub fn new(rng: &'r mut R) -> Self {
        Self { rng }
    }

    /// Instantiate a function's `parameters` schema and serialize it for the
    /// `arguments` field. A missing schema yields `{}`.
    pub fn arguments(&mut self, parameters: Option<&Value>) -> Result<String, MockError> {
        let value = match parameters {
            Some(schema) => self.value(schema, None, "$")?,
            None => Value::Object(Map::new()),
        };
        Ok(serde_json::to_string(&value)?)
    }

    /// Recursively instantiate `schema`; `field` is the property name the
    /// value will be stored under, used to pick semantic string generators.
    pub fn value(
        &mut self,
        schema: &Value,
        field: Option<&str>,
        path: &str,
    ) -> Result<Value, MockError> {
        let Some(schema) = schema.as_object() else {
            return Err(invalid(path, "schema must be an object"));
        };

        if let Some(options) = schema.get("enum").and_then(Value::as_array) {
            if let Some(choice) = options.choose(&mut *self.rng) {
                return Ok(choice.clone());
            }
        }

        match schema_type(schema, path)? {
            Some("string") => Ok(Value::String(self.string(field))),
            Some("number") | Some("integer") => {
                Ok(Value::from(self.rng.random_range(0..=MAX_NUMBER)))
            }
            Some("boolean") => Ok(Value::Bool(self.rng.random_bool(0.5))),
            Some("array") => self.array(schema, field, path),
            Some("object") => self.object(schema, path),
            _ => Ok(Value::String(prose_fragment(&mut *self.rng))),
        }
    }

    fn string(&mut self, field: Option<&str>) -> String {
        match field.and_then(FieldKind::from_field_name) {
            Some(kind) => kind.generate(&mut *self.rng),
            None => prose_fragment(&mut *self.rng),
        }
    }

    fn array(
        &mut self,
        schema: &Map<String, Value>,
        field: Option<&str>,
        path: &str,
    ) -> Result<Value, MockError> {
        let item_path = format!("{path}[]");
        let items = match schema.get("items") {
            Some(items) if items.is_object() => Some(items),
            Some(_) => return Err(invalid(&item_path, "items must be an object")),
            None => None,
        };

        let mut values = Vec::with_capacity(ARRAY_LENGTH);
        for _ in 0..ARRAY_LENGTH {
            let value = match items {
                Some(items) => self.value(items, field, &item_path)?,
                None => Value::String(prose_fragment(&mut *self.rng)),
            };
            values.push(value);
        }
        Ok(Value::Array(values))
    }

    fn object(&mut self, schema: &Map<String, Value>, path: &str) -> Result<Value, MockError> {
        let mut object = Map::new();
        match schema.get("properties") {
            None => {}
            Some(Value::Object(properties)) => {
                for (name, property) in properties {
                    let property_path = format!("{path}.{name}");
                    object.insert(
                        name.clone(),
                        self.value(property, Some(name), &property_path)?,
                    );
                }
            }
            Some(_) => return Err(invalid(path, "properties must be an object")),
        }
        Ok(Value::Object(object))
    }
}

/// Resolve the declared type. A type list picks its first non-null entry;
/// an untyped schema with `properties` or `items` is treated as object or array.
fn schema_type<'s>(schema: &'s Map<String, Value>, path: &str) -> Result<Option<&'s str>, MockError> {
    match schema.get("type") {
        Some(Value::String(t)) => Ok(Some(t.as_str())),
        Some(Value::Array(types)) => Ok(types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")),
        Some(_) => Err(invalid(path, "type must be a string or a list of strings")),
        None if schema.contains_key("properties") => Ok(Some("object")),
        None if schema.contains_key("items") => Ok(Some("array")),
        None => Ok(None),
    }
}

fn invalid(path: &str, reason: &str) -> MockError {
    MockError::InvalidSchema {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn weather_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string"},
                "days": {"type": "number"},
                "metric": {"type": "boolean"},
                "contact": {
                    "type": "object",
                    "properties": {
                        "email": {"type": "string"},
                        "phone_number": {"type": "string"}
                    }
                },
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    #[test]
    fn test_same_seed_same_arguments() {
        let schema = weather_schema();
        let first = FakeDataGenerator::new(&mut StdRng::seed_from_u64(9))
            .arguments(Some(&schema))
            .unwrap();
        let second = FakeDataGenerator::new(&mut StdRng::seed_from_u64(9))
            .arguments(Some(&schema))
            .unwrap();
        assert_eq!(first, second);

        let other = FakeDataGenerator::new(&mut StdRng::seed_from_u64(10))
            .arguments(Some(&schema))
            .unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_generated_shape_matches_schema() {
        let mut rng = StdRng::seed_from_u64(3);
        let arguments = FakeDataGenerator::new(&mut rng)
            .arguments(Some(&weather_schema()))
            .unwrap();
        let value: Value = serde_json::from_str(&arguments).unwrap();

        assert!(value["location"].is_string());
        let days = value["days"].as_i64().unwrap();
        assert!((0..=MAX_NUMBER).contains(&days));
        assert!(value["metric"].is_boolean());
        assert!(value["contact"]["email"].as_str().unwrap().contains('@'));
        assert!(value["contact"]["phone_number"]
            .as_str()
            .unwrap()
            .starts_with('('));
        assert_eq!(value["tags"].as_array().unwrap().len(), ARRAY_LENGTH);
    }

    #[test]
    fn test_array_of_objects() {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {"productName": {"type": "string"}, "price": {"type": "string"}}
            }
        });
        let mut rng = StdRng::seed_from_u64(5);
        let value = FakeDataGenerator::new(&mut rng)
            .value(&schema, None, "$")
            .unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), ARRAY_LENGTH);
        for item in items {
            assert_eq!(item["productName"].as_str().unwrap().split(' ').count(), 3);
            assert!(item["price"].as_str().unwrap().parse::<f64>().is_ok());
        }
    }

    #[test]
    fn test_field_kind_recognition() {
        assert_eq!(FieldKind::from_field_name("name"), Some(FieldKind::Name));
        assert_eq!(
            FieldKind::from_field_name("productName"),
            Some(FieldKind::ProductName)
        );
        assert_eq!(
            FieldKind::from_field_name("job_title"),
            Some(FieldKind::JobTitle)
        );
        assert_eq!(
            FieldKind::from_field_name("credit-card-number"),
            Some(FieldKind::CreditCardNumber)
        );
        assert_eq!(
            FieldKind::from_field_name("currencyCode"),
            Some(FieldKind::CurrencyCode)
        );
        assert_eq!(FieldKind::from_field_name("UUID"), Some(FieldKind::Uuid));
        assert_eq!(FieldKind::from_field_name("location"), None);
    }

    #[test]
    fn test_category_values_are_plausible() {
        let mut rng = StdRng::seed_from_u64(11);

        let uuid = FieldKind::Uuid.generate(&mut rng);
        assert!(uuid::Uuid::parse_str(&uuid).is_ok());

        let date = FieldKind::Date.generate(&mut rng);
        assert!(DateTime::parse_from_rfc3339(&date).is_ok());

        let code = FieldKind::CurrencyCode.generate(&mut rng);
        assert_eq!(code.len(), 3);

        let price = FieldKind::Price.generate(&mut rng);
        assert_eq!(price.split('.').nth(1).map(str::len), Some(2));
    }

    #[test]
    fn test_credit_card_passes_luhn() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..50 {
            let number = FieldKind::CreditCardNumber.generate(&mut rng);
            let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();
            assert_eq!(digits.len(), 16);
            let sum: u32 = digits
                .iter()
                .rev()
                .enumerate()
                .map(|(i, d)| {
                    if i % 2 == 1 {
                        let doubled = d * 2;
                        if doubled > 9 {
                            doubled - 9
                        } else {
                            doubled
                        }
                    } else {
                        *d
                    }
                })
                .sum();
            assert_eq!(sum % 10, 0, "{number} fails the Luhn check");
        }
    }

    #[test]
    fn test_missing_or_unknown_type_falls_back_to_prose() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut generator = FakeDataGenerator::new(&mut rng);
        let untyped = generator.value(&json!({}), Some("id"), "$").unwrap();
        assert!(untyped.as_str().unwrap().ends_with('.'));
        let unknown = generator
            .value(&json!({"type": "null"}), None, "$")
            .unwrap();
        assert!(unknown.is_string());
    }

    #[test]
    fn test_enum_values_are_respected() {
        let mut rng = StdRng::seed_from_u64(1);
        let schema = json!({"type": "string", "enum": ["celsius", "fahrenheit"]});
        let value = FakeDataGenerator::new(&mut rng)
            .value(&schema, Some("unit"), "$")
            .unwrap();
        assert!(value == "celsius" || value == "fahrenheit");
    }

    #[test]
    fn test_missing_parameters_yield_empty_object() {
        let mut rng = StdRng::seed_from_u64(1);
        let arguments = FakeDataGenerator::new(&mut rng).arguments(None).unwrap();
        assert_eq!(arguments, "{}");
    }

    #[test]
    fn test_malformed_schema_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let schema = json!({"type": "object", "properties": ["not", "a", "map"]});
        let err = FakeDataGenerator::new(&mut rng)
            .arguments(Some(&schema))
            .unwrap_err();
        assert!(matches!(err, MockError::InvalidSchema { .. }));

        let nested = json!({"type": "object", "properties": {"a": {"type": "array", "items": 3}}});
        let err = FakeDataGenerator::new(&mut rng)
            .arguments(Some(&nested))
            .unwrap_err();
        assert!(err.to_string().contains("$.a[]"));
    }
}
