use std::env;

#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum nesting the interpreter and the result mapper descend into.
    pub max_depth: u32,
    /// Whether mapped objects carry the descriptor of the type they came from.
    pub set_type_information: bool,
}

#[cfg(debug_assertions)]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_depth: 64, // Lower limit for debug builds.
            set_type_information: true,
        }
    }
}

#[cfg(not(debug_assertions))]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_depth: 256,
            set_type_information: true,
        }
    }
}

impl Options {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(depth_str) = lookup("RQ_MAX_DEPTH") {
            match depth_str.parse::<u32>() {
                Ok(depth) if depth > 0 => options.max_depth = depth,
                _ => tracing::warn!(
                    "Invalid RQ_MAX_DEPTH value '{}', using default {}",
                    depth_str,
                    options.max_depth
                ),
            }
        }

        if let Some(flag) = lookup("RQ_TYPE_INFORMATION") {
            options.set_type_information = match flag.to_lowercase().as_str() {
                "1" | "true" | "on" => true,
                "0" | "false" | "off" => false,
                _ => {
                    tracing::warn!("Invalid RQ_TYPE_INFORMATION value '{}', using default true", flag);
                    true
                }
            };
        }

        options
    }
}
