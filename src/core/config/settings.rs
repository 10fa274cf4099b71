use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, CatalogSettings, ConfigError, CorsSettings, GradingSettings, RuntimeSettings,
    SecuritySettings, ServerHost, ServerPort, ServerSettings, SessionSettings, Settings,
    TelemetrySettings,
};

const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "http://localhost:8080",
];

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMGATE_HOST", "0.0.0.0");
        let port = env_or_default("EXAMGATE_PORT", "8000");

        let environment =
            parse_environment(env_optional("EXAMGATE_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("EXAMGATE_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examgate API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins =
            parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"), DEFAULT_CORS_ORIGINS)?;

        let catalog_path = env_optional("CATALOG_PATH");

        let sweep_interval_seconds = parse_u64(
            "SWEEP_INTERVAL_SECONDS",
            env_or_default("SWEEP_INTERVAL_SECONDS", "30"),
        )?;
        let broadcast_buffer =
            parse_usize("BROADCAST_BUFFER", env_or_default("BROADCAST_BUFFER", "256"))?;

        let scale_max = parse_f64("GRADE_SCALE_MAX", env_or_default("GRADE_SCALE_MAX", "5.0"))?;
        let strict_manual_grading = env_optional("STRICT_MANUAL_GRADING")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let log_level = env_or_default("EXAMGATE_LOG_LEVEL", "info");
        let json = env_optional("EXAMGATE_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let prometheus_enabled = env_optional("PROMETHEUS_ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            catalog: CatalogSettings { path: catalog_path },
            session: SessionSettings { sweep_interval_seconds, broadcast_buffer },
            grading: GradingSettings { scale_max, strict_manual_grading },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn catalog(&self) -> &CatalogSettings {
        &self.catalog
    }

    pub(crate) fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.broadcast_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "BROADCAST_BUFFER",
                value: "0".to_string(),
            });
        }

        if self.session.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !self.grading.scale_max.is_finite() || self.grading.scale_max <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADE_SCALE_MAX",
                value: self.grading.scale_max.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if std::env::var("SECRET_KEY").map(|value| value.trim().is_empty()).unwrap_or(true) {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }

        let Some(path) = &self.catalog.path else {
            return Err(ConfigError::MissingSecret("CATALOG_PATH"));
        };
        let catalog = std::path::Path::new(path);
        if !catalog.exists() || !catalog.is_file() {
            return Err(ConfigError::InvalidValue {
                field: "CATALOG_PATH",
                value: path.clone(),
            });
        }

        Ok(())
    }
}
