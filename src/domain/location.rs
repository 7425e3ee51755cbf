const KNOWN_DISTRICTS: [&str; 12] = [
    "Rosemont",
    "Ville-Marie",
    "Plateau",
    "Centre-ville",
    "Outremont",
    "Verdun",
    "LaSalle",
    "Mercier",
    "Hochelaga",
    "Villeray",
    "Ahuntsic",
    "CDN",
];

pub const DEFAULT_DISTRICT: &str = "Centre-ville";

/// Derives the district a free-text location belongs to.
///
/// A known district keyword anywhere in the text wins (first in list order),
/// then the segment after the last comma, then [`DEFAULT_DISTRICT`].
pub fn district_of(location: &str) -> String {
    let lowered = location.to_lowercase();
    if let Some(known) = KNOWN_DISTRICTS
        .iter()
        .find(|district| lowered.contains(&district.to_lowercase()))
    {
        return (*known).to_string();
    }

    if let Some((_, tail)) = location.rsplit_once(',') {
        let tail = tail.trim();
        if !tail.is_empty() {
            return tail.to_string();
        }
    }

    DEFAULT_DISTRICT.to_string()
}
