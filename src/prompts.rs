//! Prompt builders for the four model calls in a research run.

use chrono::Local;

pub fn current_date() -> String {
    Local::now().format("%B %d, %Y").to_string()
}

/// Planner prompt: produce diverse, location-specific search queries as a
/// JSON object with `rationale` and `query` keys.
pub fn query_writer(topic: &str, number_queries: usize) -> String {
    format!(
        "Your goal is to generate sophisticated and diverse web search queries for restaurant research.\n\
         \n\
         Instructions:\n\
         - Focus queries on the SPECIFIC LOCATION mentioned in the user's question. If the user asks about a restaurant at a specific location, target that location, not the chain in general.\n\
         - Ensure all search queries are country/region-specific; include the country or city name to avoid cross-country information.\n\
         - Cover aspects such as customer reviews, menu/pricing, recent updates, and dietary/allergen info when relevant.\n\
         - Prefer a single query; only add more if the question asks about multiple aspects. Each query should focus on one aspect.\n\
         - Don't produce more than {number_queries} queries, and don't generate near-duplicate queries.\n\
         - Queries should gather the most current information. The current date is {current_date}.\n\
         \n\
         Format your response as a JSON object with exactly these keys:\n\
         - \"rationale\": brief explanation of why these queries are relevant\n\
         - \"query\": a list of search queries\n\
         \n\
         Context: {topic}",
        number_queries = number_queries,
        current_date = current_date(),
        topic = topic,
    )
}

/// Grounded-search prompt: research one query and synthesize a verifiable
/// summary, tracking sources for every claim.
pub fn web_searcher(query: &str) -> String {
    format!(
        "Conduct targeted web searches to gather the most recent, credible information on \"{query}\" and synthesize it into a verifiable text artifact.\n\
         \n\
         Instructions:\n\
         - The current date is {current_date}; prefer the most current information.\n\
         - Conduct multiple, diverse searches to gather comprehensive information.\n\
         - Consolidate key findings while meticulously tracking the source(s) for each specific piece of information.\n\
         - The output should be a well-written summary based on your search findings.\n\
         - Only include information found in the search results; don't make anything up.\n\
         \n\
         Research Topic:\n\
         {query}",
        query = query,
        current_date = current_date(),
    )
}

/// Reflection prompt: judge sufficiency of the accumulated summaries and
/// name follow-up queries for any knowledge gap, as a JSON object.
pub fn reflection(topic: &str, summaries: &str) -> String {
    format!(
        "You are an expert research assistant analyzing summaries about \"{topic}\".\n\
         \n\
         Instructions:\n\
         - Identify knowledge gaps or areas that need deeper exploration.\n\
         - If the provided summaries are sufficient to answer the user's question, don't generate a follow-up query.\n\
         - If there is a knowledge gap, generate self-contained follow-up queries that include the context needed for web search.\n\
         \n\
         Format your response as a JSON object with exactly these keys:\n\
         - \"is_sufficient\": true or false\n\
         - \"knowledge_gap\": what information is missing or needs clarification (\"\" if sufficient)\n\
         - \"follow_up_queries\": a list of specific questions addressing the gap ([] if sufficient)\n\
         \n\
         Summaries:\n\
         {summaries}",
        topic = topic,
        summaries = summaries,
    )
}

/// Answer prompt: the final restaurant report, keeping every citation
/// marker carried by the summaries.
pub fn answer(topic: &str, summaries: &str) -> String {
    format!(
        "Generate a high-quality answer to the user's question based on the provided summaries.\n\
         \n\
         Instructions:\n\
         - The current date is {current_date}.\n\
         - You are a restaurant research assistant. Focus on the SPECIFIC LOCATION mentioned in the user's question; only fall back to chain-level information for the same country/region when location-specific information is unavailable.\n\
         - Do not include information from other countries or regions.\n\
         - Structure your answer using the following Markdown headings (##):\n\
         \n\
         ## 🍽️ Worth Trying\n\
         List the top 5 most recommended dishes or items from this restaurant.\n\
         \n\
         ## 💰 Pricing\n\
         Provide budget information and typical meal costs.\n\
         \n\
         ## ⭐ Customer Reviews\n\
         Describe the overall dining experience and customer feedback from the restaurant's country/region.\n\
         \n\
         ## 🎉 Recent Updates\n\
         Focus on promotions, deals, new menu items, and recent developments.\n\
         \n\
         ## 🥗 Dietary/Allergen Info\n\
         Provide information about dietary restrictions and allergen considerations.\n\
         \n\
         - If any section has no information, write: \"No information found.\"\n\
         - You MUST carry over all citations from the summaries into the answer correctly.\n\
         \n\
         User Context:\n\
         - {topic}\n\
         \n\
         Summaries:\n\
         {summaries}",
        current_date = current_date(),
        topic = topic,
        summaries = summaries,
    )
}
