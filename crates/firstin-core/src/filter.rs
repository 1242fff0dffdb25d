use crate::job::Job;
use crate::traits::JobFilter;

/// Keyword filter on title and location.
///
/// A job passes when its title contains any include keyword and none of the
/// exclude keywords, and its location contains any include location and none
/// of the exclude locations. Matching is case-insensitive substring; empty
/// include lists pass everything.
#[derive(Debug, Clone, Default)]
pub struct TitleAndLocationFilter {
    title_keywords: Vec<String>,
    title_exclude_keywords: Vec<String>,
    locations: Vec<String>,
    exclude_locations: Vec<String>,
}

impl TitleAndLocationFilter {
    pub fn new(
        title_keywords: Vec<String>,
        title_exclude_keywords: Vec<String>,
        locations: Vec<String>,
        exclude_locations: Vec<String>,
    ) -> Self {
        // Lowercase once at construction; matching happens on every fetched job.
        Self {
            title_keywords: lowercase_all(title_keywords),
            title_exclude_keywords: lowercase_all(title_exclude_keywords),
            locations: lowercase_all(locations),
            exclude_locations: lowercase_all(exclude_locations),
        }
    }
}

fn lowercase_all(items: Vec<String>) -> Vec<String> {
    items.into_iter().map(|s| s.to_lowercase()).collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

impl JobFilter for TitleAndLocationFilter {
    fn matches(&self, job: &Job) -> bool {
        let title = job.title.to_lowercase();
        let location = job.location.to_lowercase();

        if !self.title_keywords.is_empty() && !contains_any(&title, &self.title_keywords) {
            return false;
        }
        if contains_any(&title, &self.title_exclude_keywords) {
            return false;
        }
        if !self.locations.is_empty() && !contains_any(&location, &self.locations) {
            return false;
        }
        if contains_any(&location, &self.exclude_locations) {
            return false;
        }

        true
    }
}
