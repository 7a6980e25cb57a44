use pagepilot_core::{ActionCatalog, ContextSnapshot, ExecutionOutcome, READ_ACTION, TASK_COMPLETE};

/// Exact reply the classifier gives when a request needs page actions.
pub const ACTIONS_REQUIRED: &str = "ACTIONS_REQUIRED";

/// Seeds a loop session: role, catalog, workflow rules, then the page structure.
pub fn system_prompt(catalog: &ActionCatalog, context: &ContextSnapshot) -> String {
    format!(
        "You operate a web page on behalf of a user by choosing one action at a time.\n\
         \n\
         # Available actions\n\
         {actions}\n\
         \n\
         # Rules\n\
         - Reply with exactly one JSON object: {{\"action\": \"<name>\", \"parameters\": {{...}}, \"confidence\": <0.0-1.0>}}.\n\
         - Only use the actions listed above and the parameters they declare.\n\
         - Before summarizing, answering, or extracting from a section, read it with `{read}` first.\n\
         - Never invent page content you have not read.\n\
         - When the request is satisfied, reply with `{complete}` and put the answer in `summary`.\n\
         - Lower your confidence when the request is ambiguous.\n\
         \n\
         # Page\n\
         {page}",
        actions = catalog.render_detailed(),
        read = READ_ACTION,
        complete = TASK_COMPLETE,
        page = context.render(),
    )
}

pub fn classifier_system_prompt(catalog: &ActionCatalog) -> String {
    format!(
        "You decide whether a request about a web page can be answered directly.\n\
         The page can be operated with these actions:\n\
         {actions}\n\
         \n\
         If answering needs any of these actions (reading, navigating, extracting or scrolling the page), \
         reply with exactly `{sentinel}` and nothing else.\n\
         Otherwise reply with the answer itself.",
        actions = catalog.summary(),
        sentinel = ACTIONS_REQUIRED,
    )
}

/// Turn sent to the session asking for the next structured command.
pub fn parse_request(current_prompt: &str, context: &ContextSnapshot) -> String {
    let mut request = format!(
        "Request: {current_prompt}\n\
         \n\
         Respond with the single JSON command that performs the next step."
    );
    if !context.is_empty() {
        request.push_str("\nKnown sections: ");
        let titles: Vec<&str> =
            context.sections.iter().map(|section| section.title.as_str()).collect();
        request.push_str(&titles.join(", "));
    }
    request
}

/// Asked after a successful action; the reply becomes the next iteration's prompt.
pub fn next_action_query(outcome: &ExecutionOutcome) -> String {
    format!(
        "{}\n\
         Given this result and the original request, what should be done next? \
         If the request is now satisfied, say that the task is complete and give the answer.",
        outcome.describe()
    )
}

#[cfg(test)]
mod tests {
    use pagepilot_core::{
        ActionCatalog, ActionPayload, ContextSnapshot, ExecutionOutcome, PageSection,
    };

    use super::{
        classifier_system_prompt, next_action_query, parse_request, system_prompt,
        ACTIONS_REQUIRED,
    };

    #[test]
    fn system_prompt_includes_catalog_rules_and_page() {
        let context = ContextSnapshot::new(vec![PageSection::new("About", "#about")]);
        let prompt = system_prompt(&ActionCatalog::builtin(), &context);

        assert!(prompt.contains("## navigate"));
        assert!(prompt.contains("read it with `read_content` first"));
        assert!(prompt.contains("1. About (#about)"));
    }

    #[test]
    fn system_prompt_tolerates_missing_page_structure() {
        let prompt = system_prompt(&ActionCatalog::builtin(), &ContextSnapshot::default());
        assert!(prompt.contains("No page structure is available."));
    }

    #[test]
    fn classifier_prompt_names_sentinel() {
        let prompt = classifier_system_prompt(&ActionCatalog::builtin());
        assert!(prompt.contains(ACTIONS_REQUIRED));
        assert!(prompt.contains("- scroll:"));
    }

    #[test]
    fn parse_request_lists_known_sections() {
        let context = ContextSnapshot::new(vec![
            PageSection::new("Intro", "#intro"),
            PageSection::new("About", "#about"),
        ]);
        let request = parse_request("go to about", &context);
        assert!(request.starts_with("Request: go to about"));
        assert!(request.ends_with("Known sections: Intro, About"));
    }

    #[test]
    fn next_action_query_embeds_result() {
        let outcome = ExecutionOutcome::succeeded(
            "navigate",
            ActionPayload::Navigated { title: "About".to_string(), locator: "#about".to_string() },
        );
        assert!(next_action_query(&outcome).starts_with("Action `navigate` succeeded."));
    }
}
