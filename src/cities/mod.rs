use thiserror::Error;

/// Marketplace directory for the United States, as listed on
/// https://m.facebook.com/marketplace/directory/US/
///
/// Keys are matched exactly as callers send them, so the historical
/// spellings stay in place.
const US_CITIES: &[(&str, &str)] = &[
    ("New York", "nyc"),
    ("Los Angeles", "la"),
    ("Las Vegas", "vegas"),
    ("Chicago", "chicago"),
    ("Houston", "houston"),
    ("San Antonio", "sanantonio"),
    ("Miami", "miami"),
    ("Orlando", "orlando"),
    ("San Diego", "sandiego"),
    ("Arlington", "arlington"),
    ("Balitmore", "baltimore"),
    ("Cincinnati", "cincinnati"),
    ("Denver", "denver"),
    ("Fort Worth", "fortworth"),
    ("Jacksonville", "jacksonville"),
    ("Memphis", "memphis"),
    ("Nashville", "nashville"),
    ("Philadelphia", "philly"),
    ("Portland", "portland"),
    ("San Jose", "sanjose"),
    ("Tucson", "tucson"),
    ("Atlanta", "atlanta"),
    ("Boston", "boston"),
    ("Columnbus", "columbus"),
    ("Detroit", "detroit"),
    ("Honolulu", "honolulu"),
    ("Kansas City", "kansascity"),
    ("New Orleans", "neworleans"),
    ("Phoenix", "phoenix"),
    ("Seattle", "seattle"),
    ("Washington DC", "dc"),
    ("Milwaukee", "milwaukee"),
    ("Sacremento", "sac"),
    ("Austin", "austin"),
    ("Charlotte", "charlotte"),
    ("Dallas", "dallas"),
    ("El Paso", "elpaso"),
    ("Indianapolis", "indianapolis"),
    ("Louisville", "louisville"),
    ("Minneapolis", "minneapolis"),
    ("Oaklahoma City", "oklahoma"),
    ("Pittsburgh", "pittsburgh"),
    ("San Francisco", "sanfrancisco"),
    ("Tampa", "tampa"),
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{city} is not a city we are currently supporting on the Facebook Marketplace. Please reach out to us to add this city in our directory.")]
pub struct UnsupportedCity {
    pub city: String,
}

/// Static city name -> marketplace path segment table
#[derive(Debug, Clone)]
pub struct CityDirectory {
    entries: Vec<(String, String)>,
}

impl CityDirectory {
    pub fn us() -> Self {
        Self::from_pairs(US_CITIES.iter().copied())
    }

    /// Later duplicates of a name are ignored so keys stay unique.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (name, slug) in pairs {
            if entries.iter().any(|(existing, _)| existing == name) {
                continue;
            }
            entries.push((name.to_string(), slug.to_string()));
        }
        Self { entries }
    }

    pub fn resolve(&self, city: &str) -> Result<&str, UnsupportedCity> {
        self.entries
            .iter()
            .find(|(name, _)| name == city)
            .map(|(_, slug)| slug.as_str())
            .ok_or_else(|| UnsupportedCity {
                city: capitalize(city),
            })
    }

    pub fn contains(&self, city: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == city)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CityDirectory {
    fn default() -> Self {
        Self::us()
    }
}

/// First character upper-cased, the rest lower-cased ("new YORK" -> "New york").
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
