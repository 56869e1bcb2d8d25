use log::info;

/// Records progress lines for a named component.
pub struct LogManager {
    component: Option<&'static str>,
}

impl LogManager {
    pub fn new() -> Self {
        Self { component: None }
    }

    pub fn for_component(component: &'static str) -> Self {
        Self {
            component: Some(component),
        }
    }

    pub fn record(&self, message: &str) {
        match self.component {
            Some(component) => info!("[{}] {}", component, message),
            None => info!("{}", message),
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
