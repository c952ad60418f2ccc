//! Built-in tools

mod arxiv_search;
mod current_time;
mod europe_pmc_search;
mod tavily_search;
mod wikipedia_search;
mod write_text_file;

use std::sync::Arc;

use reflex_agent::ToolRegistry;

pub use arxiv_search::ArxivSearchTool;
pub use current_time::CurrentTimeTool;
pub use europe_pmc_search::EuropePmcSearchTool;
pub use tavily_search::TavilySearchTool;
pub use wikipedia_search::WikipediaSearchTool;
pub use write_text_file::WriteTextFileTool;

/// Which tools a command gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolset {
    /// Nothing registered
    None,
    /// Web, encyclopedia and literature search
    Research,
    /// Every built-in tool
    All,
}

/// Build the registry for `toolset`
pub fn registry(
    toolset: Toolset,
    tavily_key: Option<String>,
) -> reflex_agent::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    if toolset == Toolset::None {
        return Ok(registry);
    }

    registry.register(Arc::new(TavilySearchTool::new(tavily_key, None)))?;
    registry.register(Arc::new(ArxivSearchTool::new()))?;
    registry.register(Arc::new(WikipediaSearchTool::new()))?;
    registry.register(Arc::new(EuropePmcSearchTool::new()))?;
    if toolset == Toolset::All {
        registry.register(Arc::new(CurrentTimeTool::new()))?;
        registry.register(Arc::new(WriteTextFileTool::new()))?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolsets() {
        assert!(registry(Toolset::None, None).unwrap().is_empty());
        assert_eq!(
            registry(Toolset::Research, None).unwrap().names(),
            vec![
                "tavily_search",
                "arxiv_search",
                "wikipedia_search",
                "europe_pmc_search"
            ]
        );
        assert_eq!(registry(Toolset::All, None).unwrap().len(), 6);
    }
}
