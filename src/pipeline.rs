use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Read-only snapshot of the pipeline that triggered the plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub repo: Repo,
    pub build: Build,
    pub commit: Commit,
    pub stage: Stage,
    pub step: Step,
    pub semver: SemVer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repo {
    pub owner: String,
    pub name: String,
    pub slug: String,
    pub link: String,
    pub branch: String,
    pub visibility: String,
    pub private: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Build {
    pub number: u64,
    pub parent: u64,
    pub status: String,
    pub event: String,
    pub link: String,
    pub deploy_to: String,
    pub created: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
}

impl Build {
    pub const SUCCESS: &'static str = "success";

    pub fn succeeded(&self) -> bool {
        self.status == Self::SUCCESS
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub before: String,
    pub after: String,
    pub branch: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub message: String,
    pub link: String,
    /// Login of the commit author on the SCM host.
    pub author: String,
    pub author_name: String,
    pub author_email: String,
    pub author_avatar: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub number: u64,
    pub kind: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    pub status: String,
    pub machine: String,
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub number: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemVer {
    pub version: String,
    pub major: String,
    pub minor: String,
    pub patch: String,
    pub prerelease: String,
    pub build: String,
    pub short: String,
    pub valid: bool,
}

impl SemVer {
    pub fn parse_error(&self) -> bool {
        !self.version.is_empty() && !self.valid
    }
}

impl Pipeline {
    /// Reads the `DRONE_*` variables the runner exports into the step.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).unwrap_or_default();
        let number = |key: &str| text(key).trim().parse::<u64>().unwrap_or_default();
        let flag = |key: &str| matches!(text(key).trim(), "true" | "1");
        let time = |key: &str| timestamp(text(key).trim().parse::<i64>().unwrap_or_default());

        let owner = lookup("DRONE_REPO_OWNER")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| text("DRONE_REPO_NAMESPACE"));
        let semver_error = text("DRONE_SEMVER_ERROR");
        let semver = text("DRONE_SEMVER");

        Self {
            repo: Repo {
                owner,
                name: text("DRONE_REPO_NAME"),
                slug: text("DRONE_REPO"),
                link: text("DRONE_REPO_LINK"),
                branch: text("DRONE_REPO_BRANCH"),
                visibility: text("DRONE_REPO_VISIBILITY"),
                private: flag("DRONE_REPO_PRIVATE"),
            },
            build: Build {
                number: number("DRONE_BUILD_NUMBER"),
                parent: number("DRONE_BUILD_PARENT"),
                status: text("DRONE_BUILD_STATUS"),
                event: text("DRONE_BUILD_EVENT"),
                link: text("DRONE_BUILD_LINK"),
                deploy_to: text("DRONE_DEPLOY_TO"),
                created: time("DRONE_BUILD_CREATED"),
                started: time("DRONE_BUILD_STARTED"),
                finished: time("DRONE_BUILD_FINISHED"),
            },
            commit: Commit {
                sha: text("DRONE_COMMIT_SHA"),
                before: text("DRONE_COMMIT_BEFORE"),
                after: text("DRONE_COMMIT_AFTER"),
                branch: text("DRONE_COMMIT_BRANCH"),
                git_ref: text("DRONE_COMMIT_REF"),
                message: text("DRONE_COMMIT_MESSAGE"),
                link: text("DRONE_COMMIT_LINK"),
                author: text("DRONE_COMMIT_AUTHOR"),
                author_name: text("DRONE_COMMIT_AUTHOR_NAME"),
                author_email: text("DRONE_COMMIT_AUTHOR_EMAIL"),
                author_avatar: text("DRONE_COMMIT_AUTHOR_AVATAR"),
            },
            stage: Stage {
                name: text("DRONE_STAGE_NAME"),
                number: number("DRONE_STAGE_NUMBER"),
                kind: text("DRONE_STAGE_KIND"),
                stage_type: text("DRONE_STAGE_TYPE"),
                status: text("DRONE_STAGE_STATUS"),
                machine: text("DRONE_STAGE_MACHINE"),
                os: text("DRONE_STAGE_OS"),
                arch: text("DRONE_STAGE_ARCH"),
            },
            step: Step {
                name: text("DRONE_STEP_NAME"),
                number: number("DRONE_STEP_NUMBER"),
            },
            semver: SemVer {
                valid: !semver.is_empty() && semver_error.is_empty(),
                version: semver,
                major: text("DRONE_SEMVER_MAJOR"),
                minor: text("DRONE_SEMVER_MINOR"),
                patch: text("DRONE_SEMVER_PATCH"),
                prerelease: text("DRONE_SEMVER_PRERELEASE"),
                build: text("DRONE_SEMVER_BUILD"),
                short: text("DRONE_SEMVER_SHORT"),
            },
        }
    }
}

/// Converts a unix timestamp as exported by the runner, treating zero as unset.
pub(crate) fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}
