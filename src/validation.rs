use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    Email,
    Phone,
    Ip,
    Mac,
    Serial,
}

// Keyed by display name. Underscore spellings come from older templates.
const FORMAT_FIELDS: [(&str, Pattern); 15] = [
    ("Email", Pattern::Email),
    ("Contact_Email", Pattern::Email),
    ("Contact Email", Pattern::Email),
    ("IP_Address", Pattern::Ip),
    ("IP Address", Pattern::Ip),
    ("Network_IP", Pattern::Ip),
    ("Network IP", Pattern::Ip),
    ("MAC_Address", Pattern::Mac),
    ("MAC Address", Pattern::Mac),
    ("Serial_Number", Pattern::Serial),
    ("Serial Number", Pattern::Serial),
    ("Phone", Pattern::Phone),
    ("Phone Number", Pattern::Phone),
    ("Contact_Phone", Pattern::Phone),
    ("Contact Phone", Pattern::Phone),
];

const DATE_FIELDS: [&str; 8] = [
    "Purchase_Date",
    "Purchase Date",
    "Warranty_End",
    "Warranty End",
    "Last_Maintenance",
    "Last Maintenance",
    "Audit Date",
    "Audit_Date",
];

const MONEY_FIELDS: [&str; 4] = ["Purchase_Price", "Purchase Price", "Current_Value", "Current Value"];

const SERIAL_FIELD: &str = "Serial Number";
const MIN_SERIAL_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Bulleted text for a message box: errors first, then warnings.
    pub fn all_messages(&self) -> String {
        let mut lines = Vec::new();
        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            lines.extend(self.errors.iter().map(|e| format!("• {}", e)));
        }
        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            lines.extend(self.warnings.iter().map(|w| format!("• {}", w)));
        }
        lines.join("\n")
    }
}

/// Required-field, format and business-rule checks over a display-name keyed
/// record. One instance per process; it holds only compiled patterns.
#[derive(Debug, Clone)]
pub struct AssetValidator {
    email: Regex,
    phone: Regex,
    ip: Regex,
    mac: Regex,
    serial: Regex,
    date: Regex,
}

impl AssetValidator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            email: Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")?,
            phone: Regex::new(r"^\+?1?[-.\s]?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}$")?,
            ip: Regex::new(
                r"^(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$",
            )?,
            mac: Regex::new(r"^([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})$")?,
            serial: Regex::new(r"^[A-Za-z0-9\-_]+$")?,
            // chrono's %Y takes any digit count and a sign.
            date: Regex::new(r"^[0-9]{1,2}/[0-9]{1,2}/[0-9]{4}$")?,
        })
    }

    fn pattern(&self, p: Pattern) -> &Regex {
        match p {
            Pattern::Email => &self.email,
            Pattern::Phone => &self.phone,
            Pattern::Ip => &self.ip,
            Pattern::Mac => &self.mac,
            Pattern::Serial => &self.serial,
        }
    }

    /// Runs every check; nothing short-circuits.
    pub fn validate(&self, record: &HashMap<String, String>, required_fields: &[String]) -> ValidationResult {
        let mut result = ValidationResult::default();
        self.check_required(record, required_fields, &mut result);
        self.check_formats(record, &mut result);
        self.check_business_rules(record, &mut result);
        tracing::debug!(
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "record validated"
        );
        result
    }

    fn check_required(&self, record: &HashMap<String, String>, required: &[String], result: &mut ValidationResult) {
        for field in required {
            let present = record.get(field).map(|v| !v.trim().is_empty()).unwrap_or(false);
            if !present {
                result.add_error(format!("Required field '{}' is missing or empty", field));
            }
        }
    }

    fn check_formats(&self, record: &HashMap<String, String>, result: &mut ValidationResult) {
        for (field, pattern) in FORMAT_FIELDS {
            let Some(value) = record.get(field).map(|v| v.trim()) else {
                continue;
            };
            if !value.is_empty() && !self.pattern(pattern).is_match(value) {
                result.add_error(format!("Invalid format for '{}': {}", field, value));
            }
        }
    }

    fn check_business_rules(&self, record: &HashMap<String, String>, result: &mut ValidationResult) {
        if let Some(serial) = record.get(SERIAL_FIELD).map(|v| v.trim()) {
            if !serial.is_empty() && serial.chars().count() < MIN_SERIAL_LEN {
                result.add_warning("Serial Number should be at least 3 characters long for better tracking");
            }
        }

        for field in DATE_FIELDS {
            let Some(value) = record.get(field) else {
                continue;
            };
            if !self.is_valid_date(value) {
                result.add_error(format!(
                    "Invalid date format for '{}'. Expected format: MM/DD/YYYY",
                    field
                ));
            }
        }

        for field in MONEY_FIELDS {
            let Some(value) = record.get(field) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            match parse_money(value) {
                Some(amount) if amount < 0.0 => {
                    result.add_warning(format!("Negative value for '{}' may indicate an error", field))
                }
                Some(_) => {}
                None => result.add_error(format!("Invalid monetary value for '{}': {}", field, value)),
            }
        }
    }

    /// Single-field check for live form feedback. Returns the message to show
    /// when the value is rejected; blank values always pass.
    pub fn validate_field(&self, field: &str, value: &str) -> Option<&'static str> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let pattern = FORMAT_FIELDS
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, p)| *p);
        match pattern {
            Some(Pattern::Email) if !self.email.is_match(value) => Some("Invalid email format"),
            Some(Pattern::Ip) if !self.ip.is_match(value) => Some("Invalid IP address format"),
            Some(Pattern::Mac) if !self.mac.is_match(value) => {
                Some("Invalid MAC address format (XX:XX:XX:XX:XX:XX)")
            }
            Some(Pattern::Phone) if !self.phone.is_match(value) => Some("Invalid phone number format"),
            Some(_) => None,
            None if field.contains("Date") && !self.is_valid_date(value) => {
                Some("Invalid date format (MM/DD/YYYY)")
            }
            None => None,
        }
    }

    /// Month/day/four-digit-year. Either padded or unpadded day is accepted.
    /// Blank is valid.
    pub fn is_valid_date(&self, value: &str) -> bool {
        let value = value.trim();
        value.is_empty()
            || (self.date.is_match(value) && NaiveDate::parse_from_str(value, "%m/%d/%Y").is_ok())
    }

    /// Compares a CSV header row against the fields a template expects.
    pub fn validate_template_compatibility(&self, csv_headers: &[String], template_fields: &[String]) -> ValidationResult {
        let csv: BTreeSet<&str> = csv_headers.iter().map(String::as_str).collect();
        let template: BTreeSet<&str> = template_fields.iter().map(String::as_str).collect();
        let missing: Vec<&str> = template.difference(&csv).copied().collect();
        let extra: Vec<&str> = csv.difference(&template).copied().collect();

        let mut result = ValidationResult::default();
        if !missing.is_empty() {
            result.add_error(format!("Missing required fields: {}", missing.join(", ")));
        }
        if !extra.is_empty() {
            result.add_warning(format!("Extra fields in CSV: {}", extra.join(", ")));
        }
        result
    }
}

fn parse_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '$' && *c != ',').collect();
    cleaned.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
