//! The HackerNews research team: three agent roles plus a coordinating team.

use std::sync::Arc;

use crate::agent::{Agent, AgentDescriptor};
use crate::config::Config;
use crate::llm::{ChatModel, OpenAiChat};
use crate::security::SessionCredential;
use crate::team::{Orchestrator, Team, TeamDescriptor};
use crate::tools::{ArticleReaderTools, DuckDuckGoTools, HackerNewsTools, ToolDefinition};
use crate::ResearchMeshError;

pub const TEAM_NAME: &str = "HackerNews AI Team";

pub const HACKERNEWS_RESEARCHER: &str = "HackerNews Researcher";
pub const WEB_SEARCHER: &str = "Web Searcher";
pub const ARTICLE_READER: &str = "Article Reader";

pub const HACKERNEWS_RESEARCHER_ROLE: &str = "Finds and analyzes top HackerNews stories.";
pub const WEB_SEARCHER_ROLE: &str = "Searches the web for deeper context.";
pub const ARTICLE_READER_ROLE: &str = "Reads and extracts insights from articles.";

pub const TEAM_INSTRUCTIONS: [&str; 4] = [
    "Search HackerNews for relevant stories.",
    "Read the linked articles for context.",
    "Search the web for additional insights.",
    "Produce a thoughtful, engaging summary.",
];

/// Builds a ready-to-run orchestrator for one session credential.
///
/// Implementations must be free of hidden state: building twice from the same
/// credential yields teams with equal descriptors.
pub trait TeamFactory: Send + Sync {
    fn build(&self, credential: &SessionCredential)
    -> Result<Arc<dyn Orchestrator>, ResearchMeshError>;
}

#[derive(Debug, Clone, Default)]
pub struct ResearchTeamFactory {
    config: Config,
}

impl ResearchTeamFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wire the three roles and the team around an already constructed model.
    pub fn assemble(&self, model: Arc<dyn ChatModel>) -> Result<Team, ResearchMeshError> {
        let tools = &self.config.tools;
        let rounds = self.config.team.max_tool_rounds;
        let markdown = self.config.team.markdown;

        let hn_researcher = Agent::new(
            HACKERNEWS_RESEARCHER,
            HACKERNEWS_RESEARCHER_ROLE,
            model.clone(),
            Arc::new(HackerNewsTools::new(tools)?),
        )
        .with_markdown(markdown)
        .with_max_tool_rounds(rounds);

        let web_searcher = Agent::new(
            WEB_SEARCHER,
            WEB_SEARCHER_ROLE,
            model.clone(),
            Arc::new(DuckDuckGoTools::new(tools)?),
        )
        .with_datetime_context()
        .with_markdown(markdown)
        .with_max_tool_rounds(rounds);

        let article_reader = Agent::new(
            ARTICLE_READER,
            ARTICLE_READER_ROLE,
            model.clone(),
            Arc::new(ArticleReaderTools::new(tools)?),
        )
        .with_markdown(markdown)
        .with_max_tool_rounds(rounds);

        Ok(Team::new(TEAM_NAME, model)
            .with_member(hn_researcher)
            .with_member(web_searcher)
            .with_member(article_reader)
            .with_instructions(TEAM_INSTRUCTIONS)
            .with_markdown(self.config.team.markdown)
            .with_debug_mode(self.config.team.debug_mode)
            .with_members_responses(self.config.team.show_members_responses))
    }

    /// Describe the team from configuration alone. No agent, toolkit or
    /// HTTP client is constructed.
    pub fn descriptor(&self) -> TeamDescriptor {
        let model = &self.config.llm.model;
        let member = |name: &str, role: &str, toolkit: &str, functions: Vec<ToolDefinition>, datetime: bool| {
            AgentDescriptor {
                name: name.to_string(),
                role: role.to_string(),
                model: model.clone(),
                toolkit: toolkit.to_string(),
                functions: functions.into_iter().map(|function| function.name).collect(),
                add_datetime_to_context: datetime,
            }
        };

        TeamDescriptor {
            name: TEAM_NAME.to_string(),
            model: model.clone(),
            members: vec![
                member(
                    HACKERNEWS_RESEARCHER,
                    HACKERNEWS_RESEARCHER_ROLE,
                    HackerNewsTools::NAME,
                    HackerNewsTools::definitions(),
                    false,
                ),
                member(
                    WEB_SEARCHER,
                    WEB_SEARCHER_ROLE,
                    DuckDuckGoTools::NAME,
                    DuckDuckGoTools::definitions(),
                    true,
                ),
                member(
                    ARTICLE_READER,
                    ARTICLE_READER_ROLE,
                    ArticleReaderTools::NAME,
                    ArticleReaderTools::definitions(),
                    false,
                ),
            ],
            instructions: TEAM_INSTRUCTIONS.map(String::from).to_vec(),
            markdown: self.config.team.markdown,
            debug_mode: self.config.team.debug_mode,
            show_members_responses: self.config.team.show_members_responses,
        }
    }
}

impl TeamFactory for ResearchTeamFactory {
    fn build(
        &self,
        credential: &SessionCredential,
    ) -> Result<Arc<dyn Orchestrator>, ResearchMeshError> {
        let model: Arc<dyn ChatModel> =
            Arc::new(OpenAiChat::new(credential.clone(), &self.config.llm)?);
        Ok(Arc::new(self.assemble(model)?))
    }
}
