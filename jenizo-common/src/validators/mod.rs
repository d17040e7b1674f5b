use lettre::Address;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

const MAX_EMAIL_LENGTH: usize = 254;

static DOMAIN_LABEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9\x{00a1}-\x{ffff}]([a-zA-Z0-9\x{00a1}-\x{ffff}-]{0,61}[a-zA-Z0-9\x{00a1}-\x{ffff}])?$",
    )
    .expect("Domain label pattern should compile")
});

static TOP_LEVEL_DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z\x{00a1}-\x{ffff}]{2,}|xn--[a-zA-Z0-9-]{2,})$")
        .expect("Top-level domain pattern should compile")
});

static INQUIRY_PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+0-9\s\-()]{7,50}$").expect("Inquiry phone pattern should compile")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormKind {
    Contact,
    Inquiry,
}

/// Field name to user-facing message, in the order the fields were checked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<(&'static str, &'static str)>);

impl FieldErrors {
    fn insert(&mut self, field: &'static str, message: &'static str) {
        self.0.push((field, message));
    }

    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.iter().find(|(f, _)| *f == field).map(|(_, m)| *m)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.0.iter().copied()
    }
}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, message) in &self.0 {
            map.serialize_entry(field, message)?;
        }
        map.end()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactFields {
    name: String,
    email: Address,
    phone: String,
    message: String,
}

impl ContactFields {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &Address {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InquiryFields {
    full_name: String,
    email: Address,
    phone: String,
    project_type: String,
    budget: String,
    description: Option<String>,
}

impl InquiryFields {
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn email(&self) -> &Address {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn project_type(&self) -> &str {
        &self.project_type
    }

    pub fn budget(&self) -> &str {
        &self.budget
    }

    /// `None` when the submitter left the description empty.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Trimmed and checked form values. Only `validate()` produces these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidatedFields {
    Contact(ContactFields),
    Inquiry(InquiryFields),
}

impl ValidatedFields {
    pub fn kind(&self) -> FormKind {
        match self {
            ValidatedFields::Contact(_) => FormKind::Contact,
            ValidatedFields::Inquiry(_) => FormKind::Inquiry,
        }
    }

    pub fn submitter_name(&self) -> &str {
        match self {
            ValidatedFields::Contact(f) => f.name(),
            ValidatedFields::Inquiry(f) => f.full_name(),
        }
    }

    pub fn submitter_email(&self) -> &Address {
        match self {
            ValidatedFields::Contact(f) => f.email(),
            ValidatedFields::Inquiry(f) => f.email(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationResult {
    field_errors: FieldErrors,
    fields: Option<ValidatedFields>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.field_errors.is_empty()
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    /// `Some` only when the submission is valid.
    pub fn fields(&self) -> Option<&ValidatedFields> {
        self.fields.as_ref()
    }

    pub fn into_result(self) -> Result<ValidatedFields, FieldErrors> {
        match self.fields {
            Some(fields) if self.field_errors.is_empty() => Ok(fields),
            _ => Err(self.field_errors),
        }
    }
}

/// Checks every rule for the given form and reports all violations at once.
pub fn validate(kind: FormKind, raw: &Map<String, Value>) -> ValidationResult {
    match kind {
        FormKind::Contact => validate_contact(raw),
        FormKind::Inquiry => validate_inquiry(raw),
    }
}

fn validate_contact(raw: &Map<String, Value>) -> ValidationResult {
    let name = text_field(raw, "name");
    let email = text_field(raw, "email");
    let phone = text_field(raw, "phone");
    let message = text_field(raw, "message");

    let mut errors = FieldErrors::default();

    if name.chars().count() < 2 {
        errors.insert("name", "Name is required.");
    }

    let address = parse_email_address(&email);
    if address.is_none() {
        errors.insert("email", "Valid email is required.");
    }

    if phone.chars().count() < 7 {
        errors.insert("phone", "Valid phone number is required.");
    }

    if message.chars().count() < 5 {
        errors.insert("message", "Message is too short.");
    }

    let fields = match address {
        Some(email) if errors.is_empty() => Some(ValidatedFields::Contact(ContactFields {
            name,
            email,
            phone,
            message,
        })),
        _ => None,
    };

    ValidationResult {
        field_errors: errors,
        fields,
    }
}

fn validate_inquiry(raw: &Map<String, Value>) -> ValidationResult {
    let full_name = text_field(raw, "fullName");
    let email = text_field(raw, "email");
    let phone = text_field(raw, "phone");
    let project_type = text_field(raw, "projectType");
    let budget = text_field(raw, "budget");
    let description = text_field(raw, "description");

    let mut errors = FieldErrors::default();

    if full_name.is_empty() {
        errors.insert("fullName", "Full name is required.");
    }

    let address = parse_email_address(&email);
    if address.is_none() {
        errors.insert("email", "Valid email is required.");
    }

    if !INQUIRY_PHONE_PATTERN.is_match(&phone) {
        errors.insert("phone", "Invalid phone number.");
    }

    if project_type.is_empty() {
        errors.insert("projectType", "Project type is required.");
    }

    if budget.is_empty() {
        errors.insert("budget", "Budget is required.");
    }

    let fields = match address {
        Some(email) if errors.is_empty() => Some(ValidatedFields::Inquiry(InquiryFields {
            full_name,
            email,
            phone,
            project_type,
            budget,
            description: if description.is_empty() {
                None
            } else {
                Some(description)
            },
        })),
        _ => None,
    };

    ValidationResult {
        field_errors: errors,
        fields,
    }
}

fn text_field(raw: &Map<String, Value>, key: &str) -> String {
    match raw.get(key) {
        Some(Value::String(s)) => String::from(s.trim()),
        _ => String::new(),
    }
}

/// Parses an address the way a typical `isEmail` check would accept it: a sane length, no
/// whitespace, and a dotted hostname. Bare hostnames (`user@localhost`), IP literals, labels
/// outside `[A-Za-z0-9-]` and non-alphabetic top-level domains are rejected.
pub fn parse_email_address(email: &str) -> Option<Address> {
    if email.is_empty() || email.chars().count() > MAX_EMAIL_LENGTH {
        return None;
    }

    if email.chars().any(char::is_whitespace) {
        return None;
    }

    let (user, domain) = email.rsplit_once('@')?;

    if user.is_empty() {
        return None;
    }

    let (_, tld) = domain.rsplit_once('.')?;
    if !TOP_LEVEL_DOMAIN_PATTERN.is_match(tld) {
        return None;
    }

    if !domain.split('.').all(|label| DOMAIN_LABEL_PATTERN.is_match(label)) {
        return None;
    }

    email.parse::<Address>().ok()
}
