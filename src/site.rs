//! Per-site page knowledge: URL templates, selectors and behavioural quirks.
//
// Everything a workflow needs to know about a specific booking site lives here as data, so
// a site that changes its markup only needs a config override, not a code change.

use serde::{Deserialize, Serialize};

const YELP_CANCEL_BUTTON: &str =
    "//button[@data-button='true' and .//span[normalize-space()='Cancel']]";
const YELP_ERROR_BANNER: &str = "//div[@aria-label='Error' and @role='alert']";

/// Sites with a built-in cancellation flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Yelp,
    OpenTable,
}

impl Default for Site {
    fn default() -> Self {
        Site::Yelp
    }
}

impl Site {
    pub fn cancellation_profile(&self) -> CancellationProfile {
        match self {
            Site::Yelp => CancellationProfile::yelp(),
            Site::OpenTable => CancellationProfile::opentable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFields {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub special_requests: String,
}

/// A validation message the page shows next to a rejected field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrorProbe {
    pub field: String,
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub name: String,
    /// Placeholders: `{restaurant}`, `{date}`, `{time}` (HHMM), `{party}`
    pub availability_url: String,
    pub checkout_url: String,
    pub date_input: String,
    pub party_option: String,
    pub single_party_option: String,
    pub slot_buttons: String,
    pub no_availability: String,
    pub error_banner: String,
    pub checkout_heading: String,
    pub form_heading: String,
    pub confirm_button: String,
    pub cancel_affordance: String,
    /// Abort on the first contact field that cannot be filled
    pub strict_fields: bool,
    pub pivot_index: usize,
    pub fields: FormFields,
    pub field_errors: Vec<FieldErrorProbe>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::yelp()
    }
}

impl SiteProfile {
    pub fn yelp() -> Self {
        let field = |label: &str| format!("//label[.//span[contains(text(),'{}')]]//input", label);
        let probe = |field: &str, text: &str| FieldErrorProbe {
            field: field.to_string(),
            selector: format!("//span[contains(text(), '{}')]", text),
        };

        Self {
            name: "yelp".to_string(),
            availability_url: "https://www.yelp.com/reservations/{restaurant}?date={date}&time={time}&covers={party}".to_string(),
            checkout_url: "https://www.yelp.com/reservations/{restaurant}/checkout/{date}/{time}/{party}".to_string(),
            date_input: "//input[@aria-label='Select a date']".to_string(),
            party_option: "//option[text()='{party} people']".to_string(),
            single_party_option: "//option[text()='1 person']".to_string(),
            slot_buttons: "//button[@data-button='true' and not(.//span[normalize-space()='Confirm']) and (.//span[contains(text(),'am')] or .//span[contains(text(),'pm')])]".to_string(),
            no_availability: "//p[text()='No Availability']".to_string(),
            error_banner: YELP_ERROR_BANNER.to_string(),
            checkout_heading: "//h2[contains(text(),'Confirm Reservation')]".to_string(),
            form_heading: "//h5[contains(text(), 'Your Information')]".to_string(),
            fields: FormFields {
                first_name: field("First Name"),
                last_name: field("Last Name"),
                phone: field("Mobile Number"),
                email: field("Email"),
                special_requests: field("Requests"),
            },
            field_errors: vec![
                probe("maximum_input", "you exceeded the maximum number of characters"),
                probe("name_invalid_characters", "Field contains invalid characters"),
                probe("mobile_number", "valid phone number"),
                probe("email", "valid email"),
            ],
            confirm_button: "//button[@data-button='true' and .//span[normalize-space()='Confirm']]"
                .to_string(),
            cancel_affordance: YELP_CANCEL_BUTTON.to_string(),
            strict_fields: false,
            pivot_index: crate::slots::DEFAULT_PIVOT_INDEX,
        }
    }

    /// Selector of the party-size option for `party`
    pub fn party_option_for(&self, party: u32) -> String {
        if party == 1 {
            self.single_party_option.clone()
        } else {
            self.party_option.replace("{party}", &party.to_string())
        }
    }
}

/// One confirm click in a cancellation dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelStep {
    pub selector: String,
    /// Reported when the button never becomes clickable
    pub missing_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationProfile {
    pub confirmation: String,
    pub missing_confirmation_reason: String,
    pub steps: Vec<CancelStep>,
}

impl CancellationProfile {
    pub fn yelp() -> Self {
        Self {
            steps: vec![
                CancelStep {
                    selector: YELP_CANCEL_BUTTON.to_string(),
                    missing_reason: "Cancel button did not appear.".to_string(),
                },
                CancelStep {
                    selector: "//button[@data-button='true' and .//span[normalize-space()='Cancel reservation']]".to_string(),
                    missing_reason: "Cancel reservation button did not appear.".to_string(),
                },
            ],
            confirmation: "//span[contains(text(), 'Your reservation has been canceled!')]"
                .to_string(),
            missing_confirmation_reason: "Cancel reservation message did not appear.".to_string(),
        }
    }

    pub fn opentable() -> Self {
        Self {
            steps: vec![CancelStep {
                selector: "//button[@data-test='continue-cancel-button']".to_string(),
                missing_reason: "Cancel button did not appear.".to_string(),
            }],
            confirmation: "//h1[contains(text(), 'has canceled your reservation')]".to_string(),
            missing_confirmation_reason: "Cancellation confirmation did not appear.".to_string(),
        }
    }
}

/// Substitute `{key}` placeholders in a URL template
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
