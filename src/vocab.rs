use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing street-type token: the last whitespace-delimited run of
/// characters, optionally ending in a period.
static STREET_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\S+\.?$").unwrap()
});

pub static VOCABULARY: Lazy<Vocabulary> = Lazy::new(Vocabulary::new);

/// Street-type corrections observed in one specific dataset. These are data,
/// not a rule set: entries are case-sensitive exact matches, and a handful of
/// keys are whole-name literals for records a trailing-token swap cannot fix.
pub struct Vocabulary {
    mapping: HashMap<&'static str, &'static str>,
    expected: HashSet<&'static str>,
}

impl Vocabulary {
    fn new() -> Vocabulary {
        let mapping = HashMap::from([
            ("St", "Street"),
            ("St.", "Street"),
            ("Str", "Street"),
            ("str", "Street"),
            ("street", "Street"),
            ("Ci", "Circle"),
            ("Cir", "Circle"),
            ("Cnr", "Corner"),
            ("Cr", "Circle"),
            ("ct.", "Court"),
            ("Ct", "Court"),
            ("Alicia Pkwy @ Via Linda", "Alicia Parkway @ Via Linda"),
            ("Blvd & Citrus Ave", "Boulevard & Citrus Avenue"),
            ("Orangethorpe Av @ Magnolia Av", "Orangethorpe Avenue @ Magnolia Avenue"),
            ("Gothard  St @ Center Ave Ne", "Gothard Street @ Center Avenue NE"),
            ("9004 Lakewood Blvd: Nw Quad I-5 / Lakewood (Sr 19) Ic Off Vista Del Rosa St",
             "9004 Lakewood Boulevard: NW Quad I-5 / Lakewood (Sr 19) Ic Off Vista Del Rosa Street"),
            ("4980 Sweetgrass Ln Riverview Evangelical Church",
             "4980 Sweetgrass Lane Riverview Evangelical Church"),
            ("Western Ave # O", "Western Avenue # O"),
            ("RAVENSWOOD PL", "Ravenswood Place"),
            ("SOUTH BREEZY WAY", "South Breezy Way"),
            ("Pine grove road", "Pine Grove Road"),
            ("Se Cnr Sr 55 & Lincoln Av", "SE Corner Sr 55 & Lincoln Avenue"),
            ("W 6TH ST", "W 6th Street"),
            ("Aven", "Avenue"),
            ("Ave", "Avenue"),
            ("ave", "Avenue"),
            ("Av", "Avenue"),
            ("Rd. at Telephone Rd.", "Road at Telephone Road"),
            ("Rd", "Road"),
            ("Rd.", "Road"),
            ("Pky", "Parkway"),
            ("Pkwy", "Parkway"),
            ("Pkwy.", "Parkway"),
            ("Dr", "Drive"),
            ("Dr.", "Drive"),
            ("Bl", "Boulevard"),
            ("blvd", "Boulevard"),
            ("Blv", "Boulevard"),
            ("Bl.", "Boulevard"),
            ("Bd.", "Boulevard"),
            ("Bvd", "Boulevard"),
            ("Blvd", "Boulevard"),
            ("Blvd.", "Boulevard"),
            ("Ln.", "Lane"),
            ("Ln", "Lane"),
            ("Ave Ne", "Avenue NE"),
            ("Ave #0", "Avenue #0"),
            ("Te", "Terrace"),
            ("Tl", "Trail"),
            ("Tr", "Trail"),
            ("Ave Ic", "Avenue Interchange"),
            ("Dr Ic", "Drive Interchange"),
            ("Rd Ic", "Road Interchange"),
            ("Ic", "Interchange"),
            ("Str Int", "Street Intersection"),
            ("Int", "Intersection"),
            ("Ctr", "Center"),
            ("Hwy", "Highway"),
            ("Pl", "Place"),
            ("Vw", "View"),
            ("way", "Way"),
            ("Wa", "Way"),
            ("Wy", "Way"),
        ]);

        let expected = HashSet::from([
            "Street", "Avenue", "Boulevard", "Drive", "Circle", "Corner",
            "Court", "Place", "Square", "Lane", "Road", "Trail", "Parkway",
            "Commons", "Freeway", "Terrace", "Interchange", "Center",
            "Highway", "Intersection", "View", "Way",
        ]);

        Vocabulary { mapping, expected }
    }

    /// The trailing street-type token of `name`, if any.
    pub fn street_type<'a>(&self, name: &'a str) -> Option<&'a str> {
        STREET_TYPE_RE.find(name).map(|m| m.as_str())
    }

    /// Whether a trailing token is a canonical street-type word that needs
    /// no correction.
    pub fn is_expected(&self, street_type: &str) -> bool {
        self.expected.contains(street_type)
    }

    /// Fixes the street-type abbreviation at the end of `name`, leaving the
    /// rest of the string untouched. Whole-name literal corrections match
    /// first, on the entire input only. Unknown tokens pass through
    /// unchanged; flagging them is the audit's job, not this function's.
    pub fn normalize(&self, name: &str) -> String {
        if let Some(replacement) = self.mapping.get(name) {
            return (*replacement).to_string();
        }
        if let Some(m) = STREET_TYPE_RE.find(name) {
            if let Some(replacement) = self.mapping.get(m.as_str()) {
                let mut fixed = String::with_capacity(m.start() + replacement.len());
                fixed.push_str(&name[..m.start()]);
                fixed.push_str(replacement);
                return fixed;
            }
        }
        name.to_string()
    }
}
