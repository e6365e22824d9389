//! Finding the Slack account responsible for a build.
//!
//! The commit author is looked up in the user mapping first, by email and then
//! by SCM login. A mapping hit is searched for by Slack name; without one the
//! roster is searched by profile email. The roster scan is linear and the
//! first matching user wins, so when several users match, the result depends
//! on the order the platform lists them in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, trace, warn};

use crate::mapping::DirectoryMapping;
use crate::pipeline::Commit;
use crate::slack::{MessagingPlatform, PlatformError, SlackUser};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no user to search for")]
    NoIdentity,

    #[error("failed to query users: {0}")]
    Directory(#[from] PlatformError),
}

/// How a search key is compared against a Slack user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    /// Exact match on profile display name or real name.
    ByUsername,
    /// Case-insensitive match on profile email.
    ByEmail,
}

impl LookupStrategy {
    pub fn matches(self, user: &SlackUser, key: &str) -> bool {
        match self {
            Self::ByUsername => user.profile.display_name == key || user.real_name == key,
            Self::ByEmail => user.profile.email.to_lowercase() == key.to_lowercase(),
        }
    }
}

/// Where a search key came from, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    MappedEmail,
    MappedAuthor,
    AuthorEmail,
}

impl KeySource {
    fn as_str(self) -> &'static str {
        match self {
            Self::MappedEmail => "build.email",
            Self::MappedAuthor => "build.author",
            Self::AuthorEmail => "commit.author_email",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    pub strategy: LookupStrategy,
    pub key: String,
    pub source: KeySource,
}

impl UserQuery {
    pub fn find<'a>(&self, users: &'a [SlackUser]) -> Option<&'a SlackUser> {
        users.iter().find(|user| {
            let found = self.strategy.matches(user, &self.key);
            if !found {
                trace!(username = %user.name, email = %user.profile.email, "user");
            }
            found
        })
    }
}

/// Whether a mapping hit or a direct email match is tried first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionOrder {
    #[default]
    MappingFirst,
    EmailFirst,
}

impl FromStr for ResolutionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "mapping-first" | "mapping" => Ok(Self::MappingFirst),
            "email-first" | "email" => Ok(Self::EmailFirst),
            other => Err(format!(
                "unknown resolution order '{other}', expected mapping-first or email-first"
            )),
        }
    }
}

impl fmt::Display for ResolutionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MappingFirst => f.write_str("mapping-first"),
            Self::EmailFirst => f.write_str("email-first"),
        }
    }
}

fn mapped_query(commit: &Commit, mapping: &DirectoryMapping) -> Option<UserQuery> {
    let (key, source) = if let Some(name) = mapping.get(&commit.author_email) {
        (name, KeySource::MappedEmail)
    } else if let Some(name) = mapping.get(&commit.author) {
        (name, KeySource::MappedAuthor)
    } else {
        return None;
    };

    Some(UserQuery {
        strategy: LookupStrategy::ByUsername,
        key: key.to_string(),
        source,
    })
}

fn email_query(commit: &Commit) -> UserQuery {
    UserQuery {
        strategy: LookupStrategy::ByEmail,
        key: commit.author_email.clone(),
        source: KeySource::AuthorEmail,
    }
}

/// Lists the queries to run, in order. Empty keys are dropped; an empty plan
/// means there is nothing to search for.
pub fn plan_queries(
    commit: &Commit,
    mapping: &DirectoryMapping,
    order: ResolutionOrder,
) -> Vec<UserQuery> {
    let mapped = mapped_query(commit, mapping);

    let plan = match order {
        ResolutionOrder::MappingFirst => vec![mapped.unwrap_or_else(|| email_query(commit))],
        ResolutionOrder::EmailFirst => std::iter::once(email_query(commit))
            .chain(mapped)
            .collect(),
    };

    plan.into_iter().filter(|q| !q.key.is_empty()).collect()
}

/// Runs the planned queries against an already fetched roster.
pub fn find_user<'a>(queries: &[UserQuery], users: &'a [SlackUser]) -> Option<&'a SlackUser> {
    queries.iter().find_map(|query| {
        let user = query.find(users)?;
        info!(
            username = %user.name,
            realname = %user.real_name,
            email = %user.profile.email,
            key = %query.key,
            source = query.source.as_str(),
            "found user"
        );
        Some(user)
    })
}

/// Fetches the roster and resolves the commit author to a Slack user.
///
/// `Ok(None)` means the roster was searched and nobody matched.
pub async fn resolve_user(
    platform: &dyn MessagingPlatform,
    commit: &Commit,
    mapping: &DirectoryMapping,
    order: ResolutionOrder,
) -> Result<Option<SlackUser>, ResolveError> {
    let queries = plan_queries(commit, mapping, order);
    if queries.is_empty() {
        return Err(ResolveError::NoIdentity);
    }

    for query in &queries {
        match query.strategy {
            LookupStrategy::ByUsername => info!(
                username = %query.key,
                "searching for user by name, using {} as key",
                query.source.as_str()
            ),
            LookupStrategy::ByEmail => info!(email = %query.key, "searching for user by email"),
        }
    }

    let users = platform.list_users().await?;
    let found = find_user(&queries, &users).cloned();
    if found.is_none() {
        warn!(
            author = %commit.author,
            email = %commit.author_email,
            scanned = users.len(),
            "no slack user matched the commit author"
        );
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::slack::UserProfile;
    use crate::slack::fake::FakePlatform;

    fn user(name: &str, real_name: &str, display_name: &str, email: &str) -> SlackUser {
        SlackUser {
            id: format!("U{name}"),
            name: name.to_string(),
            real_name: real_name.to_string(),
            profile: UserProfile {
                display_name: display_name.to_string(),
                email: email.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn commit(author: &str, email: &str) -> Commit {
        Commit {
            author: author.to_string(),
            author_email: email.to_string(),
            ..Default::default()
        }
    }

    fn roster() -> Vec<SlackUser> {
        vec![
            user("carol", "Carol Jones", "carol", "carol@example.com"),
            user("alice", "Alice Smith", "alice.platform", "alice.work@example.com"),
            user("bob", "Bob Brown", "bobby", "Bob@Example.com"),
        ]
    }

    #[test]
    fn mapping_by_email_searches_by_username() {
        let mapping: DirectoryMapping =
            [("alice@example.com".to_string(), "alice.platform".to_string())]
                .into_iter()
                .collect();

        let plan = plan_queries(
            &commit("someone-else", "alice@example.com"),
            &mapping,
            ResolutionOrder::MappingFirst,
        );

        assert_eq!(
            plan,
            vec![UserQuery {
                strategy: LookupStrategy::ByUsername,
                key: "alice.platform".to_string(),
                source: KeySource::MappedEmail,
            }]
        );
        let users = roster();
        assert_eq!(find_user(&plan, &users).map(|u| u.name.as_str()), Some("alice"));
    }

    #[test]
    fn mapping_by_email_wins_over_mapping_by_author() {
        let mapping: DirectoryMapping = [
            ("alice@example.com".to_string(), "alice.platform".to_string()),
            ("alice-gh".to_string(), "Carol Jones".to_string()),
        ]
        .into_iter()
        .collect();

        let plan = plan_queries(
            &commit("alice-gh", "alice@example.com"),
            &mapping,
            ResolutionOrder::MappingFirst,
        );

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].source, KeySource::MappedEmail);
    }

    #[test]
    fn mapping_by_author_is_used_when_email_unmapped() {
        let mapping: DirectoryMapping = [("bob-gh".to_string(), "Bob Brown".to_string())]
            .into_iter()
            .collect();

        let plan = plan_queries(
            &commit("bob-gh", "bob@personal.example"),
            &mapping,
            ResolutionOrder::MappingFirst,
        );

        assert_eq!(plan[0].source, KeySource::MappedAuthor);
        let users = roster();
        assert_eq!(find_user(&plan, &users).map(|u| u.name.as_str()), Some("bob"));
    }

    #[test]
    fn without_mapping_email_match_is_case_insensitive() {
        let plan = plan_queries(
            &commit("bob-gh", "bob@example.com"),
            &DirectoryMapping::default(),
            ResolutionOrder::MappingFirst,
        );

        assert_eq!(plan[0].strategy, LookupStrategy::ByEmail);
        let users = roster();
        assert_eq!(find_user(&plan, &users).map(|u| u.name.as_str()), Some("bob"));
    }

    #[test_case("Bob@Example.com", "bob@example.com", true ; "ascii")]
    #[test_case("ANDRÉ@example.com", "andré@example.com", true ; "non ascii")]
    #[test_case("ÖZIL@EXAMPLE.COM", "özil@example.com", true ; "umlaut")]
    #[test_case("andre@example.com", "andré@example.com", false ; "accents are significant")]
    fn email_strategy_folds_case(profile_email: &str, key: &str, expected: bool) {
        let someone = user("someone", "Some One", "some.one", profile_email);
        assert_eq!(LookupStrategy::ByEmail.matches(&someone, key), expected);
    }

    #[test_case("alice.platform", true ; "display name")]
    #[test_case("Alice Smith", true ; "real name")]
    #[test_case("alice", false ; "handle is not compared")]
    #[test_case("ALICE.PLATFORM", false ; "case sensitive")]
    fn username_strategy_compares_display_and_real_name(key: &str, expected: bool) {
        let alice = user("alice", "Alice Smith", "alice.platform", "a@example.com");
        assert_eq!(LookupStrategy::ByUsername.matches(&alice, key), expected);
    }

    #[test]
    fn empty_identity_yields_empty_plan() {
        let plan = plan_queries(
            &commit("", ""),
            &DirectoryMapping::default(),
            ResolutionOrder::MappingFirst,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn mapping_first_does_not_fall_back_to_email() {
        let mapping: DirectoryMapping =
            [("carol@example.com".to_string(), "nobody-by-that-name".to_string())]
                .into_iter()
                .collect();
        let users = roster();

        let plan = plan_queries(
            &commit("carol", "carol@example.com"),
            &mapping,
            ResolutionOrder::MappingFirst,
        );

        assert!(find_user(&plan, &users).is_none());
    }

    #[test]
    fn email_first_falls_back_to_mapping() {
        let mapping: DirectoryMapping =
            [("alice@personal.example".to_string(), "alice.platform".to_string())]
                .into_iter()
                .collect();
        let users = roster();

        let plan = plan_queries(
            &commit("alice-gh", "alice@personal.example"),
            &mapping,
            ResolutionOrder::EmailFirst,
        );

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].strategy, LookupStrategy::ByEmail);
        assert_eq!(find_user(&plan, &users).map(|u| u.name.as_str()), Some("alice"));
    }

    #[test]
    fn email_first_prefers_direct_email_match() {
        let mapping: DirectoryMapping =
            [("carol@example.com".to_string(), "Bob Brown".to_string())]
                .into_iter()
                .collect();
        let users = roster();

        let plan = plan_queries(
            &commit("carol", "carol@example.com"),
            &mapping,
            ResolutionOrder::EmailFirst,
        );

        assert_eq!(find_user(&plan, &users).map(|u| u.name.as_str()), Some("carol"));
    }

    #[test]
    fn first_listed_user_wins_ties() {
        let users = vec![
            user("first", "Same Name", "", "dup@example.com"),
            user("second", "Same Name", "", "dup@example.com"),
        ];
        let plan = plan_queries(
            &commit("", "dup@example.com"),
            &DirectoryMapping::default(),
            ResolutionOrder::MappingFirst,
        );

        for _ in 0..3 {
            assert_eq!(find_user(&plan, &users).map(|u| u.name.as_str()), Some("first"));
        }
    }

    #[test_case("mapping-first", ResolutionOrder::MappingFirst)]
    #[test_case("EMAIL_FIRST", ResolutionOrder::EmailFirst)]
    #[test_case("email", ResolutionOrder::EmailFirst)]
    fn resolution_order_parses(raw: &str, expected: ResolutionOrder) {
        assert_eq!(raw.parse::<ResolutionOrder>(), Ok(expected));
    }

    #[test]
    fn resolution_order_rejects_unknown_values() {
        assert!("random".parse::<ResolutionOrder>().is_err());
    }

    #[tokio::test]
    async fn resolve_user_reports_missing_identity_without_fetching() {
        let platform = FakePlatform {
            fail_users: true,
            ..Default::default()
        };

        let err = resolve_user(
            &platform,
            &commit("", ""),
            &DirectoryMapping::default(),
            ResolutionOrder::MappingFirst,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ResolveError::NoIdentity));
    }

    #[tokio::test]
    async fn resolve_user_surfaces_directory_failures() {
        let platform = FakePlatform {
            fail_users: true,
            ..Default::default()
        };

        let err = resolve_user(
            &platform,
            &commit("bob", "bob@example.com"),
            &DirectoryMapping::default(),
            ResolutionOrder::MappingFirst,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ResolveError::Directory(_)));
    }

    #[tokio::test]
    async fn resolve_user_returns_none_when_nobody_matches() {
        let platform = FakePlatform::with_users(roster());

        let found = resolve_user(
            &platform,
            &commit("dave", "dave@example.com"),
            &DirectoryMapping::default(),
            ResolutionOrder::MappingFirst,
        )
        .await
        .unwrap();

        assert!(found.is_none());
    }
}
