use std::collections::BTreeSet;

/// A single user edit to the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Provider(String),
    Country(String),
    /// Geo group name plus the countries it contains
    Geo(String, Vec<String>),
}

/// Which providers and countries are currently selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    providers: BTreeSet<String>,
    countries: BTreeSet<String>,
}

impl FilterState {
    pub fn new<P, C>(providers: P, countries: C) -> Self
    where
        P: IntoIterator<Item = String>,
        C: IntoIterator<Item = String>,
    {
        Self {
            providers: providers.into_iter().collect(),
            countries: countries.into_iter().collect(),
        }
    }

    pub fn providers(&self) -> &BTreeSet<String> {
        &self.providers
    }

    pub fn countries(&self) -> &BTreeSet<String> {
        &self.countries
    }

    pub fn allows(&self, provider_key: &str, country: &str) -> bool {
        self.providers.contains(provider_key) && self.countries.contains(country)
    }

    /// Probing only makes sense with at least one provider and one country.
    pub fn is_runnable(&self) -> bool {
        !self.providers.is_empty() && !self.countries.is_empty()
    }

    pub fn toggle_provider(&mut self, key: &str) {
        toggle(&mut self.providers, key);
    }

    pub fn toggle_country(&mut self, code: &str) {
        toggle(&mut self.countries, code);
    }

    /// Any country of the group selected → deselect the whole group;
    /// none selected → select every country in it.
    /// Returns whether the selection changed.
    pub fn toggle_geo(&mut self, group: &[String]) -> bool {
        if group.is_empty() {
            return false;
        }

        if group.iter().any(|c| self.countries.contains(c)) {
            for country in group {
                self.countries.remove(country);
            }
            true
        } else {
            let before = self.countries.len();
            self.countries.extend(group.iter().cloned());
            self.countries.len() != before
        }
    }

    /// Returns whether the selection changed. A single provider or country
    /// toggle always does.
    pub fn apply(&mut self, change: &FilterChange) -> bool {
        match change {
            FilterChange::Provider(key) => {
                self.toggle_provider(key);
                true
            }
            FilterChange::Country(code) => {
                self.toggle_country(code);
                true
            }
            FilterChange::Geo(_, countries) => self.toggle_geo(countries),
        }
    }
}

fn toggle(set: &mut BTreeSet<String>, value: &str) {
    if !set.remove(value) {
        set.insert(value.to_string());
    }
}
