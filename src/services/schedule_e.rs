//! Expense category to IRS Schedule E (Form 1040) line mapping.
//!
//! Historical expenses can reference categories that were retired or renamed
//! since they were recorded, so the mapping is total: anything that is not
//! recognised lands on Line 19 ("Other").

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleELine {
    Advertising,
    AutoAndTravel,
    CleaningAndMaintenance,
    Commissions,
    Insurance,
    LegalAndProfessionalFees,
    ManagementFees,
    MortgageInterest,
    OtherInterest,
    Repairs,
    Supplies,
    Taxes,
    Utilities,
    Depreciation,
    Other,
}

impl ScheduleELine {
    /// Canonical line order as printed on the form.
    pub const ALL: [ScheduleELine; 15] = [
        Self::Advertising,
        Self::AutoAndTravel,
        Self::CleaningAndMaintenance,
        Self::Commissions,
        Self::Insurance,
        Self::LegalAndProfessionalFees,
        Self::ManagementFees,
        Self::MortgageInterest,
        Self::OtherInterest,
        Self::Repairs,
        Self::Supplies,
        Self::Taxes,
        Self::Utilities,
        Self::Depreciation,
        Self::Other,
    ];

    pub fn line_number(self) -> u8 {
        match self {
            Self::Advertising => 5,
            Self::AutoAndTravel => 6,
            Self::CleaningAndMaintenance => 7,
            Self::Commissions => 8,
            Self::Insurance => 9,
            Self::LegalAndProfessionalFees => 10,
            Self::ManagementFees => 11,
            Self::MortgageInterest => 12,
            Self::OtherInterest => 13,
            Self::Repairs => 14,
            Self::Supplies => 15,
            Self::Taxes => 16,
            Self::Utilities => 17,
            Self::Depreciation => 18,
            Self::Other => 19,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Advertising => "Advertising",
            Self::AutoAndTravel => "Auto and travel",
            Self::CleaningAndMaintenance => "Cleaning and maintenance",
            Self::Commissions => "Commissions",
            Self::Insurance => "Insurance",
            Self::LegalAndProfessionalFees => "Legal and other professional fees",
            Self::ManagementFees => "Management fees",
            Self::MortgageInterest => "Mortgage interest paid to banks, etc.",
            Self::OtherInterest => "Other interest",
            Self::Repairs => "Repairs",
            Self::Supplies => "Supplies",
            Self::Taxes => "Taxes",
            Self::Utilities => "Utilities",
            Self::Depreciation => "Depreciation expense or depletion",
            Self::Other => "Other",
        }
    }
}

/// Known category codes, keyed by their normalized form.
const CATEGORY_LINES: &[(&str, ScheduleELine)] = &[
    ("advertising", ScheduleELine::Advertising),
    ("marketing", ScheduleELine::Advertising),
    ("auto_and_travel", ScheduleELine::AutoAndTravel),
    ("auto_travel", ScheduleELine::AutoAndTravel),
    ("travel", ScheduleELine::AutoAndTravel),
    ("mileage", ScheduleELine::AutoAndTravel),
    ("cleaning_and_maintenance", ScheduleELine::CleaningAndMaintenance),
    ("cleaning_maintenance", ScheduleELine::CleaningAndMaintenance),
    ("cleaning", ScheduleELine::CleaningAndMaintenance),
    ("maintenance", ScheduleELine::CleaningAndMaintenance),
    ("landscaping", ScheduleELine::CleaningAndMaintenance),
    ("pest_control", ScheduleELine::CleaningAndMaintenance),
    ("commissions", ScheduleELine::Commissions),
    ("commission", ScheduleELine::Commissions),
    ("insurance", ScheduleELine::Insurance),
    ("legal_and_professional_fees", ScheduleELine::LegalAndProfessionalFees),
    ("legal_professional_fees", ScheduleELine::LegalAndProfessionalFees),
    ("legal_and_other_professional_fees", ScheduleELine::LegalAndProfessionalFees),
    ("professional_services", ScheduleELine::LegalAndProfessionalFees),
    ("legal", ScheduleELine::LegalAndProfessionalFees),
    ("accounting", ScheduleELine::LegalAndProfessionalFees),
    ("management_fees", ScheduleELine::ManagementFees),
    ("property_management", ScheduleELine::ManagementFees),
    ("hoa_fees", ScheduleELine::ManagementFees),
    ("mortgage_interest", ScheduleELine::MortgageInterest),
    ("other_interest", ScheduleELine::OtherInterest),
    ("repairs", ScheduleELine::Repairs),
    ("repair", ScheduleELine::Repairs),
    ("supplies", ScheduleELine::Supplies),
    ("taxes", ScheduleELine::Taxes),
    ("property_taxes", ScheduleELine::Taxes),
    ("property_tax", ScheduleELine::Taxes),
    ("utilities", ScheduleELine::Utilities),
    ("depreciation", ScheduleELine::Depreciation),
    ("other", ScheduleELine::Other),
];

pub fn map_to_line(category: Option<&str>) -> ScheduleELine {
    let Some(code) = category.map(normalize_category_code) else {
        return ScheduleELine::Other;
    };
    CATEGORY_LINES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, line)| *line)
        .unwrap_or(ScheduleELine::Other)
}

/// Lowercases and folds separators, so "Cleaning & Maintenance",
/// "cleaning-and-maintenance" and "cleaning_and_maintenance" compare equal.
fn normalize_category_code(raw: &str) -> String {
    let mut code = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch == '&' {
            push_separator(&mut code);
            code.push_str("and");
            push_separator(&mut code);
        } else if ch.is_ascii_alphanumeric() {
            code.push(ch.to_ascii_lowercase());
        } else {
            push_separator(&mut code);
        }
    }
    code.trim_matches('_').to_string()
}

fn push_separator(code: &mut String) {
    if !code.is_empty() && !code.ends_with('_') {
        code.push('_');
    }
}
