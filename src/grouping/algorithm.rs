use std::collections::{BTreeSet, HashMap};

use crate::db::Comparison;

use super::types::{BrowserVariants, ComparisonGroup, GroupingStrategy, ViewportVariants};

/// Organize a flat comparison list into one group per name, ready for display.
pub fn group_comparisons(comparisons: &[Comparison]) -> Vec<ComparisonGroup> {
    // Step 1: partition by name, remembering first-seen order
    let mut names: Vec<&str> = Vec::new();
    let mut buckets: HashMap<&str, Vec<Comparison>> = HashMap::new();
    for comparison in comparisons {
        let bucket = buckets.entry(comparison.name.as_str()).or_insert_with(|| {
            names.push(comparison.name.as_str());
            Vec::new()
        });
        bucket.push(comparison.clone());
    }

    // Step 2: build each group
    let mut groups: Vec<ComparisonGroup> = names
        .into_iter()
        .filter_map(|name| {
            buckets
                .remove(name)
                .map(|members| build_group(name.to_string(), members))
        })
        .collect();

    // Step 3: multi-variant first, then larger groups, then by name
    groups.sort_by(|a, b| {
        b.is_multi_variant()
            .cmp(&a.is_multi_variant())
            .then_with(|| b.variant_count().cmp(&a.variant_count()))
            .then_with(|| a.name.cmp(&b.name))
    });
    groups
}

fn build_group(name: String, mut comparisons: Vec<Comparison>) -> ComparisonGroup {
    // Stable, so equal areas keep their input order.
    comparisons.sort_by(|a, b| viewport_area(b).cmp(&viewport_area(a)));

    let browsers: Vec<String> = distinct(comparisons.iter().filter_map(|c| c.properties.browser.clone()));
    let devices: Vec<String> = distinct(comparisons.iter().filter_map(|c| c.properties.device.clone()));

    // Largest first, following the sorted comparisons.
    let mut viewports: Vec<String> = Vec::new();
    for label in comparisons.iter().filter_map(|c| c.properties.viewport_label()) {
        if !viewports.contains(&label) {
            viewports.push(label);
        }
    }

    let grouping_strategy = if comparisons.len() <= 1 {
        GroupingStrategy::Flat
    } else if browsers.len() > 1 {
        GroupingStrategy::Browser
    } else {
        GroupingStrategy::Viewport
    };

    let variants = variant_index(&comparisons);

    ComparisonGroup {
        name,
        comparisons,
        grouping_strategy,
        variants,
        browsers,
        viewports,
        devices,
    }
}

/// Two-level index browser -> viewport -> comparisons. Missing values become a `None` key.
fn variant_index(comparisons: &[Comparison]) -> Vec<BrowserVariants> {
    let mut index: Vec<BrowserVariants> = Vec::new();

    for comparison in comparisons {
        let browser = comparison.properties.browser.clone();
        let viewport = comparison.properties.viewport_label();

        let bucket_pos = match index.iter().position(|b| b.browser == browser) {
            Some(pos) => pos,
            None => {
                index.push(BrowserVariants {
                    browser,
                    viewports: Vec::new(),
                });
                index.len() - 1
            }
        };
        let bucket = &mut index[bucket_pos];

        match bucket.viewports.iter_mut().find(|v| v.viewport == viewport) {
            Some(entry) => entry.comparisons.push(comparison.clone()),
            None => bucket.viewports.push(ViewportVariants {
                viewport,
                comparisons: vec![comparison.clone()],
            }),
        }
    }

    index
}

fn viewport_area(comparison: &Comparison) -> u64 {
    comparison
        .properties
        .viewport
        .map(|viewport| viewport.area())
        .unwrap_or(0)
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    values.collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ComparisonStatus, Viewport};

    fn shot(id: &str, name: &str, browser: Option<&str>, viewport: Option<(u32, u32)>) -> Comparison {
        let mut comparison = Comparison::new(id, name, ComparisonStatus::Passed, id, 0);
        comparison.properties.browser = browser.map(str::to_string);
        comparison.properties.viewport = viewport.map(|(width, height)| Viewport { width, height });
        comparison
    }

    #[test]
    fn browsers_split_into_browser_strategy() {
        let groups = group_comparisons(&[
            shot("1", "button", Some("chrome"), None),
            shot("2", "button", Some("firefox"), None),
        ]);

        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.grouping_strategy, GroupingStrategy::Browser);
        assert_eq!(group.browsers, vec!["chrome", "firefox"]);
        assert_eq!(group.variants.len(), 2);
        assert_eq!(group.variants[0].viewports[0].viewport, None);
    }

    #[test]
    fn viewports_sort_by_area_descending() {
        let groups = group_comparisons(&[
            shot("1", "hero", Some("chrome"), Some((375, 667))),
            shot("2", "hero", Some("chrome"), Some((1920, 1080))),
            shot("3", "hero", Some("chrome"), Some((768, 1024))),
        ]);

        let group = &groups[0];
        let ids: Vec<&str> = group.comparisons.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
        assert_eq!(group.viewports, vec!["1920x1080", "768x1024", "375x667"]);
        assert_eq!(group.grouping_strategy, GroupingStrategy::Viewport);
    }

    #[test]
    fn equal_areas_keep_input_order() {
        let groups = group_comparisons(&[
            shot("a", "card", Some("chrome"), Some((800, 600))),
            shot("b", "card", Some("firefox"), Some((600, 800))),
            shot("c", "card", Some("safari"), None),
        ]);
        let ids: Vec<&str> = groups[0].comparisons.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn groups_order_multi_variant_then_size_then_name() {
        let groups = group_comparisons(&[
            shot("1", "zeta", None, None),
            shot("2", "alpha", None, None),
            shot("3", "menu", Some("chrome"), None),
            shot("4", "menu", Some("firefox"), None),
            shot("5", "footer", Some("chrome"), Some((1, 1))),
            shot("6", "footer", Some("chrome"), Some((2, 2))),
            shot("7", "footer", Some("chrome"), Some((3, 3))),
        ]);

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["footer", "menu", "alpha", "zeta"]);
        assert_eq!(groups[2].grouping_strategy, GroupingStrategy::Flat);
    }

    #[test]
    fn missing_properties_land_under_null_keys() {
        let groups = group_comparisons(&[
            shot("1", "page", None, None),
            shot("2", "page", None, Some((10, 10))),
        ]);

        let group = &groups[0];
        assert!(group.browsers.is_empty());
        assert!(group.devices.is_empty());
        assert_eq!(group.variants.len(), 1);
        assert_eq!(group.variants[0].browser, None);
        let keys: Vec<Option<&str>> = group.variants[0]
            .viewports
            .iter()
            .map(|v| v.viewport.as_deref())
            .collect();
        assert_eq!(keys, vec![Some("10x10"), None]);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_comparisons(&[]).is_empty());
    }
}
