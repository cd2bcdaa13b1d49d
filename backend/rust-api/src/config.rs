use serde::Deserialize;
use std::env;

/// Upper bound for `quiz.p1_choices_max_diff`, in years.
pub const MAX_CHOICES_DIFF: i32 = 1000;

/// Reference constants of the quiz. Every value can be overridden under the
/// `quiz.*` key of `config/{env}.toml` or via `APP_QUIZ__*`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuizRules {
    pub p1_questions: usize,
    pub p1_choices: usize,
    pub p1_points: i32,
    pub p1_choices_max_diff: i32,
    pub p2_questions: usize,
    pub p2_points: i32,
    pub p2_partial_points: i32,
    pub p3_points: i32,
    pub expiry_minutes: i64,
}

impl Default for QuizRules {
    fn default() -> Self {
        Self {
            p1_questions: 3,
            p1_choices: 3,
            p1_points: 3,
            p1_choices_max_diff: 10,
            p2_questions: 4,
            p2_points: 8,
            p2_partial_points: 3,
            p3_points: 5,
            expiry_minutes: 20,
        }
    }
}

impl QuizRules {
    /// Smallest topic that can be played: phases 1 and 2 draw disjoint events.
    pub fn min_events(&self) -> usize {
        self.p1_questions + self.p2_questions
    }

    pub fn expiry(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.expiry_minutes)
    }

    pub fn questions_count(&self, events: usize) -> usize {
        self.p1_questions + self.p2_questions + events
    }

    pub fn potential_points(&self, events: usize) -> i32 {
        self.p1_questions as i32 * self.p1_points
            + self.p2_questions as i32 * self.p2_points
            + events as i32 * self.p3_points
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: String| Err(config::ConfigError::Message(msg));

        if self.p1_questions == 0 || self.p2_questions == 0 {
            return invalid("quiz phases 1 and 2 need at least one question".to_string());
        }
        if self.p1_choices < 2 {
            return invalid(format!(
                "quiz.p1_choices must be at least 2, got {}",
                self.p1_choices
            ));
        }
        if !(1..=MAX_CHOICES_DIFF).contains(&self.p1_choices_max_diff) {
            return invalid(format!(
                "quiz.p1_choices_max_diff must be between 1 and {}, got {}",
                MAX_CHOICES_DIFF, self.p1_choices_max_diff
            ));
        }
        // Distractors are distinct years within [year - max_diff, year + max_diff].
        let candidates = 2 * self.p1_choices_max_diff as usize + 1;
        if self.p1_choices > candidates {
            return invalid(format!(
                "quiz.p1_choices ({}) exceeds the {} years available within a difference of {}",
                self.p1_choices, candidates, self.p1_choices_max_diff
            ));
        }
        if self.expiry_minutes <= 0 {
            return invalid("quiz.expiry_minutes must be positive".to_string());
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub bind_address: String,
    /// Lifetime of a stored quiz record in Redis, independent of the quiz expiry.
    pub session_ttl_seconds: u64,
    pub quiz: QuizRules,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/jahreszahlen".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "jahreszahlen".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let bind_address = settings
            .get_string("server.bind_address")
            .or_else(|_| env::var("BIND_ADDRESS"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let session_ttl_seconds = settings
            .get_int("session.ttl_seconds")
            .ok()
            .or_else(|| {
                env::var("SESSION_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(3600) as u64;

        let quiz = match settings.get::<QuizRules>("quiz") {
            Ok(rules) => rules,
            Err(config::ConfigError::NotFound(_)) => QuizRules::default(),
            Err(e) => return Err(e),
        };
        quiz.validate()?;

        if (session_ttl_seconds as i64) < quiz.expiry().num_seconds() {
            return Err(config::ConfigError::Message(format!(
                "session.ttl_seconds ({}) must not be shorter than the quiz expiry of {} minutes",
                session_ttl_seconds, quiz.expiry_minutes
            )));
        }

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            bind_address,
            session_ttl_seconds,
            quiz,
        })
    }

    /// Configuration for tests and local tooling, without touching the environment.
    pub fn for_tests() -> Self {
        Config {
            mongo_uri: "mongodb://localhost:27017/jahreszahlen_test".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            mongo_database: "jahreszahlen_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            session_ttl_seconds: 3600,
            quiz: QuizRules::default(),
        }
    }
}
