//! Numeric reply name table.
//!
//! IRC servers report status with three-digit numeric replies. The event
//! parser maps the numerics a client cares about to stable lowercase event
//! names; a code without an entry here is surfaced as its raw digit string,
//! so unknown numerics never fail to classify.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

/// Look up the event name for a numeric reply code.
pub fn name_of(code: u16) -> Option<&'static str> {
    Some(match code {
        // Connection registration
        1 => "welcome",
        2 => "yourhost",
        3 => "created",
        4 => "myinfo",
        5 => "isupport",

        // Server statistics
        251 => "luserclient",
        252 => "luserop",
        253 => "luserunknown",
        254 => "luserchannels",
        255 => "luserme",
        265 => "localusers",
        266 => "globalusers",

        // Away / WHOIS / WHO
        301 => "away",
        305 => "unaway",
        306 => "nowaway",
        311 => "whoisuser",
        312 => "whoisserver",
        313 => "whoisoperator",
        315 => "endofwho",
        317 => "whoisidle",
        318 => "endofwhois",
        319 => "whoischannels",
        352 => "whoreply",

        // Channel state
        324 => "channelmodeis",
        329 => "creationtime",
        331 => "notopic",
        332 => "topic",
        333 => "topicinfo",
        341 => "inviting",
        353 => "namreply",
        366 => "endofnames",

        // MOTD
        372 => "motd",
        375 => "motdstart",
        376 => "endofmotd",
        422 => "nomotd",

        // Errors a client reacts to
        401 => "nosuchnick",
        402 => "nosuchserver",
        403 => "nosuchchannel",
        404 => "cannotsendtochan",
        405 => "toomanychannels",
        421 => "unknowncommand",
        431 => "nonicknamegiven",
        432 => "erroneusnickname",
        433 => "nicknameinuse",
        441 => "usernotinchannel",
        442 => "notonchannel",
        443 => "useronchannel",
        451 => "notregistered",
        461 => "needmoreparams",
        462 => "alreadyregistered",
        471 => "channelisfull",
        473 => "inviteonlychan",
        474 => "bannedfromchan",
        475 => "badchannelkey",
        482 => "chanoprivsneeded",

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_numerics() {
        assert_eq!(name_of(1), Some("welcome"));
        assert_eq!(name_of(332), Some("topic"));
        assert_eq!(name_of(376), Some("endofmotd"));
        assert_eq!(name_of(422), Some("nomotd"));
        assert_eq!(name_of(433), Some("nicknameinuse"));
    }

    #[test]
    fn test_unknown_numeric() {
        assert_eq!(name_of(999), None);
        assert_eq!(name_of(0), None);
    }
}
