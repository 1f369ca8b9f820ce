use super::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            ollama: OllamaConfig {
                protocol: "https".to_string(),
                host: "test-host".to_string(),
                port: 8080,
                model: "test-model".to_string(),
                batch_size: 32,
                ..OllamaConfig::default()
            },
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [ollama
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn missing_ollama_section_is_rejected() {
        let toml_str = r#"
            [ingest]
            chunk_size = 100
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [ollama]
            protocol = "http"
            host = "localhost"
            port = 11434
            model = "nomic-embed-text:latest"
            batch_size = 64
            embedding_dimension = 768
            timeout_seconds = 30

            [generation]
            provider = "ollama"
            model = "qwen2.5-coder:7b"

            [ingest]
            chunk_size = 200
            extensions = ["rs", "md"]
            skip_dirs = ["target"]
            prune_orphans = true

            [retrieval]
            top_k = 5

            [correction]
            max_retries = 1
            low_confidence_phrases = ["no idea"]
            low_confidence_patterns = ["(?i)^sorry"]

            [store]
            collection = "my_project"
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        assert!(config.validate().is_ok());
        assert_eq!(config.ollama.batch_size, 64);
        assert_eq!(config.generation.model, "qwen2.5-coder:7b");
        assert_eq!(config.ingest.extensions, vec!["rs", "md"]);
        assert!(config.ingest.prune_orphans);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.correction.low_confidence_phrases, vec!["no idea"]);
        assert_eq!(config.store.collection, "my_project");
        // not part of the file, defaults still apply
        assert_eq!(
            config.correction.fallback_answer,
            settings::DEFAULT_FALLBACK_ANSWER
        );
    }

    #[test]
    fn config_validation_edge_cases() {
        let config = Config {
            ollama: OllamaConfig {
                host: String::new(),
                port: 80,
                ..OllamaConfig::default()
            },
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn ollama_url_generation_with_different_hosts() {
        let configs = vec![
            ("http", "localhost", 11434, "http://localhost:11434/"),
            ("http", "127.0.0.1", 8080, "http://127.0.0.1:8080/"),
            (
                "https",
                "secure.example.com",
                443,
                "https://secure.example.com/",
            ),
        ];

        for (protocol, host, port, expected_url) in configs {
            let config = Config {
                ollama: OllamaConfig {
                    protocol: protocol.to_string(),
                    host: host.to_string(),
                    port,
                    ..OllamaConfig::default()
                },
                ..Config::default()
            };

            let url = config.ollama_url().expect("ollama_url is ok");
            assert_eq!(url.as_str(), expected_url);
        }
    }

    #[test]
    fn resolve_base_dir_prefers_override() {
        let dir = PathBuf::from("/srv/code-doc-helper");
        let resolved = resolve_base_dir(Some(dir.clone())).expect("override resolves");
        assert_eq!(resolved, dir);
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidProtocol("ftp".to_string()),
            ConfigError::InvalidPort(0),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::InvalidChunkSize(0),
            ConfigError::InvalidTopK(0),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(message.len() > 10);
        }
    }
}
