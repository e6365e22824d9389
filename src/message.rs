use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::{PreparedMessage, ValidatedSettings};
use crate::pipeline::{Build, Commit, Pipeline, Repo, SemVer, Stage, Step};
use crate::slack::{Attachment, OutgoingMessage, SlackUser, UserProfile};

pub mod template;

pub use self::template::{DEFAULT_FAILURE_TEMPLATE, DEFAULT_SUCCESS_TEMPLATE, MessageTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn of(build: &Build) -> Self {
        if build.succeeded() {
            Self::Success
        } else {
            Self::Failure
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Success => "good",
            Self::Failure => "danger",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Success => "Build succeeded",
            Self::Failure => "Build failed",
        }
    }

    pub fn default_template(self) -> &'static str {
        match self {
            Self::Success => DEFAULT_SUCCESS_TEMPLATE,
            Self::Failure => DEFAULT_FAILURE_TEMPLATE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Icon to post with. Anything starting with `http` is taken as a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSpec {
    Url(String),
    Emoji(String),
}

impl IconSpec {
    pub fn parse(icon: &str) -> Self {
        if icon.starts_with("http") {
            debug!(icon, "icon is a URL");
            Self::Url(icon.to_string())
        } else {
            debug!(icon, "icon is an emoji");
            Self::Emoji(icon.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub outcome: Outcome,
    pub color: &'static str,
    pub title: &'static str,
    pub title_link: String,
    pub text: String,
    pub image_url: Option<String>,
    pub icon: IconSpec,
    pub username: String,
    /// `@handle` of the resolved user, if any.
    pub mention: Option<String>,
}

impl RenderedMessage {
    pub fn to_outgoing(&self) -> OutgoingMessage {
        let (icon_url, icon_emoji) = match &self.icon {
            IconSpec::Url(url) => (Some(url.clone()), None),
            IconSpec::Emoji(emoji) => (None, Some(emoji.clone())),
        };

        OutgoingMessage {
            username: self.username.clone(),
            icon_url,
            icon_emoji,
            attachments: vec![Attachment {
                fallback: self.title.to_string(),
                color: self.color.to_string(),
                title: self.title.to_string(),
                title_link: self.title_link.clone(),
                text: self.text.clone(),
                image_url: self.image_url.clone(),
                mrkdwn_in: vec!["pretext".into(), "text".into(), "fields".into()],
            }],
        }
    }
}

/// Values a message template can reference.
#[derive(Debug, Serialize)]
pub struct TemplateContext<'a> {
    pub repo: &'a Repo,
    pub build: &'a Build,
    pub commit: &'a Commit,
    pub stage: &'a Stage,
    pub step: &'a Step,
    pub semver: &'a SemVer,
    /// Profile of the resolved Slack user; all fields empty when nobody matched.
    pub slack: SlackContext<'a>,
}

#[derive(Debug, Serialize)]
pub struct SlackContext<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub profile: &'a UserProfile,
}

impl<'a> TemplateContext<'a> {
    pub fn new(pipeline: &'a Pipeline, user: Option<&'a SlackUser>, empty: &'a UserProfile) -> Self {
        let slack = match user {
            Some(user) => SlackContext {
                name: &user.name,
                profile: &user.profile,
            },
            None => SlackContext {
                name: "",
                profile: empty,
            },
        };

        Self {
            repo: &pipeline.repo,
            build: &pipeline.build,
            commit: &pipeline.commit,
            stage: &pipeline.stage,
            step: &pipeline.step,
            semver: &pipeline.semver,
            slack,
        }
    }
}

/// Renders the message body, logging and returning an empty body on failure.
pub fn render_body(prepared: &PreparedMessage, context: &TemplateContext<'_>) -> String {
    let Some(template) = &prepared.template else {
        error!("message template unavailable, sending an empty body");
        return String::new();
    };

    match template.render(context) {
        Ok(text) => {
            debug!(rendered = %text, "rendered template");
            text
        }
        Err(e) => {
            error!(error = %e, "could not render template");
            String::new()
        }
    }
}

/// Picks one image uniformly at random, or none when the list is empty.
pub fn choose_image<R: Rng + ?Sized>(images: &[String], rng: &mut R) -> Option<String> {
    if !images.is_empty() {
        debug!(count = images.len(), "choosing from images");
    }
    images.choose(rng).cloned()
}

/// Builds the notification for this build.
pub fn compose<R: Rng + ?Sized>(
    pipeline: &Pipeline,
    settings: &ValidatedSettings,
    user: Option<&SlackUser>,
    rng: &mut R,
) -> RenderedMessage {
    let outcome = Outcome::of(&pipeline.build);
    let prepared = settings.message(outcome);

    match user {
        Some(user) => debug!(
            profile.first_name = %user.profile.first_name,
            profile.last_name = %user.profile.last_name,
            profile.real_name = %user.profile.real_name,
            profile.real_name_normalized = %user.profile.real_name_normalized,
            profile.display_name = %user.profile.display_name,
            profile.display_name_normalized = %user.profile.display_name_normalized,
            "profile information"
        ),
        None => debug!("user not found"),
    }

    let empty = UserProfile::default();
    let context = TemplateContext::new(pipeline, user, &empty);
    let text = render_body(prepared, &context);

    let title_link = if pipeline.commit.link.is_empty() {
        pipeline.build.link.clone()
    } else {
        pipeline.commit.link.clone()
    };

    RenderedMessage {
        outcome,
        color: outcome.color(),
        title: outcome.title(),
        title_link,
        text,
        image_url: choose_image(&prepared.images, rng),
        icon: prepared.icon.clone(),
        username: prepared.username.clone(),
        mention: user.map(|u| format!("@{}", u.name)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use secrecy::SecretString;
    use test_case::test_case;

    use super::*;
    use crate::blame::ResolutionOrder;
    use crate::config::MessageOptions;
    use crate::mapping::DirectoryMapping;

    fn pipeline(status: &str) -> Pipeline {
        let mut pipeline = Pipeline::default();
        pipeline.repo.owner = "octocat".to_string();
        pipeline.repo.name = "hello-world".to_string();
        pipeline.build.number = 42;
        pipeline.build.status = status.to_string();
        pipeline.build.link = "https://ci.example.com/octocat/hello-world/42".to_string();
        pipeline.commit.branch = "main".to_string();
        pipeline.commit.sha = "6dcb09b5b57875f334f61aebed695e2e4193db5e".to_string();
        pipeline.commit.message = "Fix the flaky test".to_string();
        pipeline.commit.link = "https://git.example.com/octocat/hello-world/commit/6dcb09b".to_string();
        pipeline.commit.author = "octocat".to_string();
        pipeline.commit.author_email = "octocat@example.com".to_string();
        pipeline
    }

    fn options(template: &str, images: &[&str]) -> MessageOptions {
        MessageOptions {
            template: template.to_string(),
            image_attachments: images.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn settings(success: MessageOptions, failure: MessageOptions) -> ValidatedSettings {
        ValidatedSettings {
            token: SecretString::from("xoxb-test".to_string()),
            channel: None,
            mapping: DirectoryMapping::default(),
            resolution_order: ResolutionOrder::default(),
            success: PreparedMessage::from_source(&success, &success.template, Outcome::Success),
            failure: PreparedMessage::from_source(&failure, &failure.template, Outcome::Failure),
        }
    }

    fn user() -> SlackUser {
        SlackUser {
            name: "octo".to_string(),
            real_name: "Octo Cat".to_string(),
            profile: UserProfile {
                first_name: "Octo".to_string(),
                display_name: "octo.cat".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test_case("success", Outcome::Success, "good", "Build succeeded")]
    #[test_case("failure", Outcome::Failure, "danger", "Build failed")]
    #[test_case("error", Outcome::Failure, "danger", "Build failed")]
    #[test_case("killed", Outcome::Failure, "danger", "Build failed")]
    #[test_case("", Outcome::Failure, "danger", "Build failed")]
    fn status_selects_outcome(status: &str, outcome: Outcome, color: &str, title: &str) {
        let settings = settings(
            options("success {{build.number}}", &[]),
            options("failed {{build.number}}", &[]),
        );
        let mut rng = StdRng::seed_from_u64(1);

        let message = compose(&pipeline(status), &settings, None, &mut rng);

        assert_eq!(message.outcome, outcome);
        assert_eq!(message.color, color);
        assert_eq!(message.title, title);
        match outcome {
            Outcome::Success => assert_eq!(message.text, "success 42"),
            Outcome::Failure => assert_eq!(message.text, "failed 42"),
        }
    }

    #[test_case("http://example.com/icon.png", IconSpec::Url("http://example.com/icon.png".into()))]
    #[test_case("https://example.com/icon.png", IconSpec::Url("https://example.com/icon.png".into()))]
    #[test_case(":drone:", IconSpec::Emoji(":drone:".into()))]
    #[test_case("httpbin", IconSpec::Url("httpbin".into()) ; "prefix test only")]
    fn icon_is_classified_by_prefix(icon: &str, expected: IconSpec) {
        assert_eq!(IconSpec::parse(icon), expected);
    }

    #[test]
    fn empty_failure_template_renders_default() {
        let empty = settings(options("", &[]), options("", &[]));
        let explicit = settings(options("", &[]), options(DEFAULT_FAILURE_TEMPLATE, &[]));
        let pipeline = pipeline("failure");
        let user = user();

        let from_default = compose(&pipeline, &empty, Some(&user), &mut StdRng::seed_from_u64(7));
        let from_explicit =
            compose(&pipeline, &explicit, Some(&user), &mut StdRng::seed_from_u64(7));

        assert_eq!(from_default.text, from_explicit.text);
        assert!(from_default.text.contains("octocat/hello-world build #42"));
        assert!(from_default.text.contains("octo.cat please take a look"));
    }

    #[test]
    fn missing_user_renders_empty_profile_fields() {
        let settings = settings(
            options("", &[]),
            options("[{{slack.name}}|{{slack.display_name}}|{{slack.real_name}}]", &[]),
        );

        let message = compose(
            &pipeline("failure"),
            &settings,
            None,
            &mut StdRng::seed_from_u64(3),
        );

        assert_eq!(message.text, "[||]");
        assert_eq!(message.mention, None);
    }

    #[test]
    fn resolved_user_is_exposed_to_template_and_mention() {
        let settings = settings(
            options("", &[]),
            options("{{slack.name}} {{slack.first_name}} {{slack.display_name}}", &[]),
        );
        let user = user();

        let message = compose(
            &pipeline("failure"),
            &settings,
            Some(&user),
            &mut StdRng::seed_from_u64(3),
        );

        assert_eq!(message.text, "octo Octo octo.cat");
        assert_eq!(message.mention.as_deref(), Some("@octo"));
    }

    #[test]
    fn malformed_template_yields_empty_body() {
        let settings = settings(options("", &[]), options("{{#each}}", &[]));

        let message = compose(
            &pipeline("failure"),
            &settings,
            None,
            &mut StdRng::seed_from_u64(3),
        );

        assert_eq!(message.text, "");
        assert_eq!(message.color, "danger");
    }

    #[test]
    fn image_is_chosen_from_configured_set() {
        let images = ["https://img/1.gif", "https://img/2.gif", "https://img/3.gif"];
        let settings = settings(options("", &images), options("", &[]));
        let pipeline = pipeline("success");
        let mut rng = StdRng::seed_from_u64(99);

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let message = compose(&pipeline, &settings, None, &mut rng);
            let image = message.image_url.expect("an image is attached");
            assert!(images.contains(&image.as_str()));
            seen.insert(image);
        }

        assert_eq!(seen.len(), images.len());
    }

    #[test]
    fn no_images_means_no_attachment_image() {
        let settings = settings(options("", &[]), options("", &[]));
        let message = compose(
            &pipeline("success"),
            &settings,
            None,
            &mut StdRng::seed_from_u64(5),
        );
        assert!(message.image_url.is_none());
    }

    #[test]
    fn title_link_falls_back_to_build_link() {
        let settings = settings(options("", &[]), options("", &[]));
        let mut pipeline = pipeline("success");
        pipeline.commit.link.clear();

        let message = compose(&pipeline, &settings, None, &mut StdRng::seed_from_u64(5));

        assert_eq!(message.title_link, "https://ci.example.com/octocat/hello-world/42");
    }

    #[test]
    fn outgoing_message_carries_attachment_and_icon() {
        let settings = settings(
            MessageOptions {
                icon: "https://example.com/drone.png".to_string(),
                ..options("", &["https://img/1.gif"])
            },
            options("", &[]),
        );

        let message = compose(
            &pipeline("success"),
            &settings,
            None,
            &mut StdRng::seed_from_u64(5),
        );
        let outgoing = message.to_outgoing();

        assert_eq!(outgoing.username, "drone");
        assert_eq!(outgoing.icon_url.as_deref(), Some("https://example.com/drone.png"));
        assert_eq!(outgoing.icon_emoji, None);
        assert_eq!(outgoing.attachments.len(), 1);
        assert_eq!(outgoing.attachments[0].color, "good");
        assert_eq!(outgoing.attachments[0].title, "Build succeeded");
        assert_eq!(outgoing.attachments[0].image_url.as_deref(), Some("https://img/1.gif"));
    }

    #[test]
    fn time_helpers_read_pipeline_timestamps() {
        let settings = settings(
            options("", &[]),
            options(
                "took {{duration build.started build.finished}}, started {{since build.started}} ago",
                &[],
            ),
        );
        let mut pipeline = pipeline("failure");
        pipeline.build.started = crate::pipeline::timestamp(1_700_000_000);
        pipeline.build.finished = crate::pipeline::timestamp(1_700_000_200);

        let message = compose(&pipeline, &settings, None, &mut StdRng::seed_from_u64(1));

        assert!(message.text.starts_with("took 3m 20s, started "), "{}", message.text);
        assert!(message.text.ends_with(" ago"), "{}", message.text);
        assert!(!message.text.contains("started  ago"), "{}", message.text);
    }

    #[test]
    fn since_counts_from_build_start() {
        let settings = settings(options("", &[]), options("{{since build.started}}", &[]));
        let mut pipeline = pipeline("failure");
        pipeline.build.started = Some(chrono::Utc::now() - chrono::Duration::hours(2));

        let message = compose(&pipeline, &settings, None, &mut StdRng::seed_from_u64(1));

        assert_eq!(message.text, "2h");
    }

    #[test]
    fn unset_build_times_render_empty() {
        let settings = settings(
            options("", &[]),
            options("[{{since build.started}}][{{duration build.started build.finished}}]", &[]),
        );

        let message = compose(&pipeline("failure"), &settings, None, &mut StdRng::seed_from_u64(1));

        assert_eq!(message.text, "[][]");
    }
}
