//! Program search and ranking.
//!
//! Pure functions over an already-loaded program list; handlers own the
//! loading (and the TTL cache in front of it).

use regex::Regex;
use serde::Deserialize;

use crate::models::Program;

/// Search filters as supplied by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub query: Option<String>,
    pub sport: Option<String>,
    #[serde(rename = "ageGroup")]
    pub age_group: Option<String>,
    /// Numeric upper bound on cost. Unparseable input ignores the filter.
    #[serde(rename = "maxCost")]
    pub max_cost: Option<String>,
    #[serde(default)]
    pub accessibility: Vec<String>,
}

/// Every text fragment a free-text token may match against.
fn searchable_fields(program: &Program) -> Vec<String> {
    let mut fields = vec![
        program.title.clone(),
        program.sport.clone(),
        program.description.clone(),
        program.venue.name.clone(),
        program.venue.suburb.clone(),
        program.venue.address.clone(),
    ];
    fields.extend(program.inclusivity_tags.iter().cloned());
    fields.extend(program.accessibility.iter().cloned());
    fields.extend(program.age_groups.iter().cloned());
    if program.cost == 0.0 {
        fields.push("free".to_string());
    }
    fields.push(program.cost_unit.clone());
    fields.retain(|f| !f.trim().is_empty());
    fields
}

/// Three-tier token match: substring of the joined text, word-boundary
/// match inside an individual field, or (tokens of 3+ chars) a
/// prefix/substring match against individual words of a field.
fn token_matches(token: &str, joined: &str, fields: &[String]) -> bool {
    if joined.contains(token) {
        return true;
    }

    let boundary = Regex::new(&format!(r"\b{}", regex::escape(token))).ok();

    fields.iter().any(|field| {
        let field_text = field.to_lowercase();

        if let Some(re) = &boundary {
            if re.is_match(&field_text) {
                return true;
            }
        }

        if token.len() >= 3 {
            return field_text
                .split_whitespace()
                .any(|word| word.starts_with(token) || word.contains(token));
        }

        false
    })
}

fn matches_query(program: &Program, query: &str) -> bool {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();
    if tokens.is_empty() {
        return true;
    }

    let fields = searchable_fields(program);
    let joined = fields.join(" ").to_lowercase();

    tokens
        .iter()
        .all(|token| token_matches(token, &joined, &fields))
}

/// Filter and rank programs. Free programs sort before paid ones, then
/// ascending cost; ties keep input order.
pub fn search(programs: Vec<Program>, filters: &SearchFilters) -> Vec<Program> {
    let mut results = programs;

    if let Some(query) = filters.query.as_deref() {
        if !query.trim().is_empty() {
            results.retain(|p| matches_query(p, query));
        }
    }

    if let Some(sport) = filters.sport.as_deref() {
        if !sport.is_empty() {
            results.retain(|p| p.sport == sport);
        }
    }

    if let Some(age_group) = filters.age_group.as_deref() {
        if !age_group.is_empty() {
            results.retain(|p| p.age_groups.iter().any(|g| g == age_group));
        }
    }

    if let Some(max_cost) = filters.max_cost.as_deref() {
        if let Ok(max_cost) = max_cost.trim().parse::<f64>() {
            if max_cost >= 0.0 {
                results.retain(|p| p.cost <= max_cost);
            }
        }
    }

    if !filters.accessibility.is_empty() {
        results.retain(|p| {
            filters
                .accessibility
                .iter()
                .any(|wanted| p.accessibility.iter().any(|have| have == wanted))
        });
    }

    results.sort_by(|a, b| {
        let a_paid = a.cost > 0.0;
        let b_paid = b.cost > 0.0;
        a_paid.cmp(&b_paid).then(a.cost.total_cmp(&b.cost))
    });

    results
}

fn featured_score(program: &Program) -> u32 {
    let mut score = 0;
    if program
        .inclusivity_tags
        .iter()
        .any(|t| t == "beginner-friendly")
    {
        score += 2;
    }
    if program.cost == 0.0 {
        score += 2;
    }
    if program.cost > 0.0 && program.cost <= 5.0 {
        score += 1;
    }
    score
}

/// Pick up to `limit` programs for the featured shelf: descending score,
/// ties broken by ascending cost.
pub fn featured(programs: Vec<Program>, limit: usize) -> Vec<Program> {
    let mut scored: Vec<(u32, Program)> = programs
        .into_iter()
        .map(|p| (featured_score(&p), p))
        .collect();

    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score.cmp(a_score).then(a.cost.total_cmp(&b.cost))
    });

    scored.into_iter().take(limit).map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn program(id: &str, cost: f64, extras: serde_json::Value) -> Program {
        let mut doc = json!({
            "id": id,
            "title": "Program",
            "sport": "General",
            "organizer_email": "org@example.com",
            "description": "",
            "cost": cost,
            "costUnit": "per session",
            "status": "active",
            "createdAt": "2026-08-01T00:00:00Z",
            "updatedAt": "2026-08-01T00:00:00Z",
        });
        if let (Some(base), Some(patch)) = (doc.as_object_mut(), extras.as_object()) {
            for (k, v) in patch {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(doc).unwrap()
    }

    fn ids(programs: &[Program]) -> Vec<&str> {
        programs.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn free_tennis_query_requires_both_tokens() {
        let programs = vec![
            program("free-tennis", 0.0, json!({ "sport": "Tennis" })),
            program("paid-tennis", 15.0, json!({ "sport": "Tennis" })),
            program("free-yoga", 0.0, json!({ "sport": "Yoga" })),
        ];

        let filters = SearchFilters {
            query: Some("free tennis".to_string()),
            ..Default::default()
        };
        let results = search(programs, &filters);
        assert_eq!(ids(&results), vec!["free-tennis"]);
    }

    #[test]
    fn ranking_puts_free_first_then_ascending_cost() {
        let programs = vec![
            program("a", 10.0, json!({})),
            program("b", 0.0, json!({})),
            program("c", 5.0, json!({})),
            program("d", 0.0, json!({})),
        ];

        let results = search(programs, &SearchFilters::default());
        let costs: Vec<f64> = results.iter().map(|p| p.cost).collect();
        assert_eq!(costs, vec![0.0, 0.0, 5.0, 10.0]);
        // Stable on ties: b before d, their input order.
        assert_eq!(ids(&results), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn token_matches_word_prefix_in_fields() {
        let programs = vec![
            program(
                "basket",
                8.0,
                json!({ "title": "Junior Basketball", "sport": "Basketball" }),
            ),
            program("swim", 8.0, json!({ "title": "Lap Swimming" })),
        ];

        let filters = SearchFilters {
            query: Some("basket".to_string()),
            ..Default::default()
        };
        let results = search(programs, &filters);
        assert_eq!(ids(&results), vec!["basket"]);
    }

    #[test]
    fn short_tokens_need_boundary_or_substring() {
        let programs = vec![
            program("pilates", 12.0, json!({ "description": "Go at your own pace" })),
            program("zumba", 12.0, json!({ "description": "High energy dance" })),
        ];

        let filters = SearchFilters {
            query: Some("go".to_string()),
            ..Default::default()
        };
        let results = search(programs, &filters);
        assert_eq!(ids(&results), vec!["pilates"]);
    }

    #[test]
    fn unparseable_max_cost_is_ignored() {
        let programs = vec![program("a", 50.0, json!({}))];
        let filters = SearchFilters {
            max_cost: Some("cheap".to_string()),
            ..Default::default()
        };
        assert_eq!(search(programs, &filters).len(), 1);
    }

    #[test]
    fn structured_filters_combine() {
        let programs = vec![
            program(
                "match",
                4.0,
                json!({
                    "sport": "Tennis",
                    "ageGroups": ["teens"],
                    "accessibility": ["wheelchair-access", "seating-available"],
                }),
            ),
            program(
                "wrong-sport",
                4.0,
                json!({ "sport": "Yoga", "ageGroups": ["teens"] }),
            ),
            program(
                "too-dear",
                40.0,
                json!({ "sport": "Tennis", "ageGroups": ["teens"] }),
            ),
        ];

        let filters = SearchFilters {
            sport: Some("Tennis".to_string()),
            age_group: Some("teens".to_string()),
            max_cost: Some("10".to_string()),
            accessibility: vec!["wheelchair-access".to_string()],
            ..Default::default()
        };
        let results = search(programs, &filters);
        assert_eq!(ids(&results), vec!["match"]);
    }

    #[test]
    fn featured_orders_by_score_then_cost() {
        let programs = vec![
            program("paid", 10.0, json!({})),
            program("cheap", 3.0, json!({})),
            program(
                "star",
                0.0,
                json!({ "inclusivityTags": ["beginner-friendly"] }),
            ),
        ];

        let results = featured(programs, 6);
        assert_eq!(ids(&results), vec!["star", "cheap", "paid"]);
    }

    #[test]
    fn featured_truncates_to_limit() {
        let programs = vec![
            program("a", 0.0, json!({})),
            program("b", 0.0, json!({})),
            program("c", 0.0, json!({})),
        ];
        assert_eq!(featured(programs, 2).len(), 2);
    }
}
