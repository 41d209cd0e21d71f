use tradegraph_models::{AgentRole, RiskStance};

use crate::parser::FINAL_PROPOSAL_MARKER;

/// Schema description included in every role prompt.
fn response_schema(role: AgentRole) -> String {
    let mut example = serde_json::json!({
        "reasoning": "<your full argument, citing the data you relied on>",
        "stance": "bullish | bearish | neutral",
        "confidence": "0.0 to 1.0",
    });
    match role {
        AgentRole::BullResearcher | AgentRole::BearResearcher => {
            example["concedes"] = serde_json::json!(false);
        }
        AgentRole::Trader | AgentRole::FundManager => {
            example["action"] = serde_json::json!("BUY | SELL | HOLD");
        }
        AgentRole::Reflector => {
            example = serde_json::json!({
                "reasoning": "<one paragraph lesson for future decisions>",
            });
        }
        _ => {}
    }
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

const PREAMBLE: &str = "You are one role in a multi-agent trading desk that decides BUY, SELL \
     or HOLD for one ticker on one trading date. The user message is a JSON context: \
     `ticker`, `date`, optional `snapshot` (normalized market data: `core_stock_apis` price \
     bars oldest first, `technical_indicators`, `fundamental_data`, `news_data`), \
     `analyst_reports`, `debate` (prior turns), `precedents` (similar past decisions with \
     their realized return and lesson), `thesis` and `trader_proposal`. Use only data dated \
     on or before `date`.";

fn role_brief(role: AgentRole, risk_stance: Option<RiskStance>) -> String {
    match role {
        AgentRole::MarketAnalyst => "## ROLE: Market analyst\n\n\
             Read the price bars and technical indicators. Describe trend, momentum, \
             volatility and key levels, and state which way they lean."
            .to_string(),
        AgentRole::FundamentalsAnalyst => "## ROLE: Fundamentals analyst\n\n\
             Read the fundamentals. Assess valuation, growth, profitability and balance \
             sheet health against the current price."
            .to_string(),
        AgentRole::NewsAnalyst => "## ROLE: News analyst\n\n\
             Read the news items. Summarize the catalysts, their likely price impact and \
             the overall sentiment."
            .to_string(),
        AgentRole::BullResearcher => "## ROLE: Bull researcher\n\n\
             Build the strongest evidence-based case for owning the stock. Rebut the \
             latest bear argument point by point. Learn from `precedents`. Set \
             `concedes` to true only if the bear case is decisively stronger."
            .to_string(),
        AgentRole::BearResearcher => "## ROLE: Bear researcher\n\n\
             Build the strongest evidence-based case against owning the stock. Rebut the \
             latest bull argument point by point. Learn from `precedents`. Set \
             `concedes` to true only if the bull case is decisively stronger."
            .to_string(),
        AgentRole::RiskManager => {
            let stance = match risk_stance.unwrap_or(RiskStance::Neutral) {
                RiskStance::Aggressive => {
                    "You argue the AGGRESSIVE view: favor upside capture and challenge \
                     excessive caution."
                }
                RiskStance::Conservative => {
                    "You argue the CONSERVATIVE view: protect capital, stress the downside \
                     and challenge over-optimism."
                }
                RiskStance::Neutral => {
                    "You argue the NEUTRAL view and synthesize: weigh the aggressive and \
                     conservative arguments already in `debate.risk` and give the balanced \
                     stance. Your stance breaks ties in the research thesis."
                }
            };
            format!("## ROLE: Risk manager\n\n{stance}")
        }
        AgentRole::Trader => format!(
            "## ROLE: Trader\n\n\
             Turn the research `thesis`, the debate and the analyst reports into a concrete \
             transaction proposal. Give an explicit `action`, and end `reasoning` with \
             `{FINAL_PROPOSAL_MARKER} BUY|SELL|HOLD`."
        ),
        AgentRole::FundManager => "## ROLE: Fund manager\n\n\
             Review the `trader_proposal` with the thesis and risk debate. To ratify, omit \
             `action` and `stance`. To override, give the `action` you require and explain \
             why in `reasoning`."
            .to_string(),
        AgentRole::Reflector => "## ROLE: Reflector\n\n\
             The context holds a past decision, the debate behind it and the `outcome` \
             (realized return and reward). Write one paragraph on what the desk got right \
             or wrong and what to do differently in a similar situation."
            .to_string(),
    }
}

/// Full system prompt for a role invocation.
pub fn system_prompt(role: AgentRole, risk_stance: Option<RiskStance>) -> String {
    format!(
        "{PREAMBLE}\n\n{}\n\n## RESPONSE FORMAT\n\n\
         Respond with a single JSON object and nothing else:\n{}",
        role_brief(role, risk_stance),
        response_schema(role)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_prompt() {
        for role in AgentRole::ALL {
            let prompt = system_prompt(role, None);
            assert!(prompt.contains("## ROLE"), "{role} prompt missing role brief");
            assert!(prompt.contains("RESPONSE FORMAT"));
        }
    }

    #[test]
    fn risk_prompt_carries_stance() {
        assert!(system_prompt(AgentRole::RiskManager, Some(RiskStance::Aggressive))
            .contains("AGGRESSIVE"));
        assert!(system_prompt(AgentRole::RiskManager, Some(RiskStance::Neutral))
            .contains("breaks ties"));
    }

    #[test]
    fn trader_prompt_requests_marker_and_action() {
        let prompt = system_prompt(AgentRole::Trader, None);
        assert!(prompt.contains(FINAL_PROPOSAL_MARKER));
        assert!(prompt.contains("\"action\""));
    }

    #[test]
    fn researchers_may_concede() {
        assert!(system_prompt(AgentRole::BullResearcher, None).contains("concedes"));
        assert!(!system_prompt(AgentRole::MarketAnalyst, None).contains("\"concedes\""));
    }
}
