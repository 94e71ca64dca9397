/// Country names accepted in job configuration and their two-letter codes
/// for the headlines endpoint.
const COUNTRIES: &[(&str, &str)] = &[
    ("Argentina", "ar"),
    ("Australia", "au"),
    ("Austria", "at"),
    ("Belgium", "be"),
    ("Brazil", "br"),
    ("Canada", "ca"),
    ("China", "cn"),
    ("France", "fr"),
    ("Germany", "de"),
    ("India", "in"),
    ("Ireland", "ie"),
    ("Italy", "it"),
    ("Japan", "jp"),
    ("Mexico", "mx"),
    ("Netherlands", "nl"),
    ("New Zealand", "nz"),
    ("Norway", "no"),
    ("Portugal", "pt"),
    ("South Africa", "za"),
    ("Spain", "es"),
    ("Sweden", "se"),
    ("Switzerland", "ch"),
    ("United Kingdom", "gb"),
    ("United States", "us"),
];

/// Case-insensitive lookup of a country name.
pub fn country_code(name: &str) -> Option<&'static str> {
    COUNTRIES
        .iter()
        .find(|(country, _)| country.eq_ignore_ascii_case(name.trim()))
        .map(|(_, code)| *code)
}
