// Text rendering of records objects for tool results

use std::fmt::Write;

use crate::auth::{SessionStatus, TestResult, TestStatus};
use crate::muckrock::{Agency, Communication, FoiaRequest, Jurisdiction, Organization, User};

/// Cut `text` to at most `max` characters, marking the cut with "..."
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn or_unknown<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "Unknown".to_string())
}

pub fn request_list(query: &str, requests: &[FoiaRequest]) -> String {
    let mut out = format!(
        "Found {} FOIA requests matching '{}':\n\n",
        requests.len(),
        query
    );
    for r in requests {
        let _ = writeln!(out, "**{}**", r.title);
        let _ = writeln!(out, "- ID: {}", r.id);
        let _ = writeln!(out, "- Status: {}", r.status);
        let _ = writeln!(out, "- Agency ID: {}", or_unknown(r.agency));
        let _ = writeln!(out, "- User ID: {}\n", or_unknown(r.user));
    }
    out
}

/// Request details with up to three communication previews
pub fn request_details(request: &FoiaRequest, communications: Option<&[Communication]>) -> String {
    let mut out = format!("**FOIA Request #{}**\n\n", request.id);
    let _ = writeln!(out, "**Title:** {}", request.title);
    let _ = writeln!(out, "**Status:** {}", request.status);
    if let Some(submitted) = &request.datetime_submitted {
        let _ = writeln!(out, "**Submitted:** {}", submitted);
    }
    if let Some(done) = &request.datetime_done {
        let _ = writeln!(out, "**Completed:** {}", done);
    }
    if let Some(url) = &request.absolute_url {
        let _ = writeln!(out, "**URL:** {}", url);
    }

    if let Some(docs) = request.requested_docs.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(
            out,
            "\n**Requested Documents:**\n{}",
            truncate_chars(docs, 500)
        );
    }

    match communications {
        Some([]) => out.push_str("\n**Communications:** None\n"),
        Some(comms) => {
            let _ = writeln!(out, "\n**Communications:** {} shown", comms.len());
            for (i, comm) in comms.iter().take(3).enumerate() {
                let body = comm.communication.as_deref().unwrap_or("No message");
                let _ = writeln!(
                    out,
                    "\nCommunication {}: {}",
                    i + 1,
                    truncate_chars(body, 200)
                );
            }
        }
        None => out.push_str("\n**Communications:** Unable to retrieve\n"),
    }

    out
}

pub fn communications(request: &FoiaRequest, comms: &[Communication]) -> String {
    let mut out = format!("**Communications for: {}**\n", request.title);
    let _ = writeln!(out, "Request ID: {}", request.id);
    let _ = writeln!(out, "Status: {}\n", request.status);

    if comms.is_empty() {
        out.push_str("No communications found.");
        return out;
    }

    let _ = writeln!(out, "Total communications: {}\n", comms.len());
    for (i, comm) in comms.iter().enumerate() {
        let sender = match comm.response {
            Some(true) => "Agency",
            _ => "User",
        };
        let _ = writeln!(out, "**Communication {}**", i + 1);
        let _ = writeln!(out, "Date: {}", comm.datetime.as_deref().unwrap_or("Unknown"));
        let _ = writeln!(out, "From: {}", sender);
        if let Some(subject) = comm.subject.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "Subject: {}", subject);
        }
        let body = comm.communication.as_deref().unwrap_or("No message");
        let _ = writeln!(out, "Message: {}", truncate_chars(body, 500));
        if !comm.files.is_empty() {
            let _ = writeln!(out, "Files: {}", comm.files.len());
        }
        out.push('\n');
    }
    out
}

pub fn files(request: &FoiaRequest, comms: &[Communication]) -> String {
    let mut out = format!("**Files for: {}**\n", request.title);
    let _ = writeln!(out, "Request ID: {}\n", request.id);

    let all: Vec<_> = comms.iter().flat_map(|c| c.files.iter()).collect();
    if all.is_empty() {
        out.push_str("No files found.");
        return out;
    }

    let _ = writeln!(out, "Total files: {}\n", all.len());
    for (i, file) in all.iter().enumerate() {
        let _ = writeln!(out, "**File {}**", i + 1);
        if let Some(title) = &file.title {
            let _ = writeln!(out, "Title: {}", title);
        }
        if let Some(url) = &file.ffile {
            let _ = writeln!(out, "URL: {}", url);
        }
        if let Some(date) = &file.datetime {
            let _ = writeln!(out, "Date: {}", date);
        }
        if let Some(pages) = file.pages {
            let _ = writeln!(out, "Pages: {}", pages);
        }
        out.push('\n');
    }
    out
}

pub fn agency_list(query: &str, agencies: &[Agency]) -> String {
    let mut out = format!(
        "Found {} agencies matching '{}':\n\n",
        agencies.len(),
        query
    );
    for a in agencies {
        let _ = writeln!(out, "- {} (ID: {})", a.name, a.id);
    }
    out
}

pub fn agency_details(agency: &Agency) -> String {
    let mut out = String::from("**Agency Details**\n\n");
    let _ = writeln!(out, "**Name:** {}", agency.name);
    let _ = writeln!(out, "**ID:** {}", agency.id);

    if let Some(jurisdiction) = agency.jurisdiction {
        let _ = writeln!(out, "**Jurisdiction ID:** {}", jurisdiction);
    }
    if let Some(status) = &agency.status {
        let _ = writeln!(out, "**Status:** {}", status);
    }
    if let Some(days) = agency.average_response_time {
        let _ = writeln!(out, "**Average Response Time:** {:.0} days", days);
    }
    if let Some(rate) = agency.fee_rate {
        let _ = writeln!(out, "**Fee Rate:** {:.1}%", rate);
    }
    if let Some(rate) = agency.success_rate {
        let _ = writeln!(out, "**Success Rate:** {:.1}%", rate);
    }

    let contact: Vec<String> = [
        agency.address.as_deref().map(|v| v.to_string()),
        agency.email.as_deref().map(|v| format!("**Email:** {}", v)),
        agency.phone.as_deref().map(|v| format!("**Phone:** {}", v)),
        agency.fax.as_deref().map(|v| format!("**Fax:** {}", v)),
    ]
    .into_iter()
    .flatten()
    .filter(|line| !line.is_empty())
    .collect();

    if !contact.is_empty() {
        out.push_str("\n**Contact Information:**\n");
        for line in contact {
            let _ = writeln!(out, "{}", line);
        }
    }
    out
}

pub fn jurisdiction_list(query: &str, jurisdictions: &[Jurisdiction]) -> String {
    let mut out = format!(
        "Found {} jurisdictions matching '{}':\n\n",
        jurisdictions.len(),
        query
    );
    for j in jurisdictions {
        let _ = write!(out, "- {} (ID: {}", j.name, j.id);
        if let Some(level) = &j.level {
            let _ = write!(out, ", level: {}", level);
        }
        if let Some(abbrev) = &j.abbrev {
            let _ = write!(out, ", {}", abbrev);
        }
        out.push_str(")\n");
    }
    out
}

fn organization_lines(out: &mut String, orgs: &[Organization]) {
    for org in orgs {
        let _ = writeln!(out, "- {} (ID: {})", org.name, org.id);
    }
}

pub fn user_info(user: &User, orgs: Option<&[Organization]>) -> String {
    let mut out = String::from("**Current User Information**\n\n");
    let _ = writeln!(out, "**Username:** {}", user.username);
    let _ = writeln!(out, "**User ID:** {}", user.id);
    if let Some(name) = user.full_name.as_deref().filter(|n| !n.is_empty()) {
        let _ = writeln!(out, "**Name:** {}", name);
    }

    match orgs {
        Some([]) => out.push_str("\n**Organizations:** None found\n"),
        Some(orgs) => {
            let _ = writeln!(out, "\n**Organizations ({}):**", orgs.len());
            organization_lines(&mut out, orgs);
        }
        None => out.push_str("\n**Organizations:** Unable to retrieve\n"),
    }
    out
}

pub fn organizations(orgs: &[Organization]) -> String {
    if orgs.is_empty() {
        return "No organizations found for your account.".to_string();
    }

    let mut out = String::from("**Your Organizations**\n\n");
    for org in orgs {
        let _ = writeln!(out, "**{}**", org.name);
        let _ = writeln!(out, "- ID: {}", org.id);
        if let Some(private) = org.private {
            let _ = writeln!(out, "- Private: {}", private);
        }
        if let Some(monthly) = org.monthly_requests {
            let _ = writeln!(out, "- Monthly Requests: {}", monthly);
        }
        if let Some(remaining) = org.number_requests {
            let _ = writeln!(out, "- Requests Remaining: {}", remaining);
        }
        out.push('\n');
    }
    let _ = writeln!(out, "**Total:** {} organizations", orgs.len());
    out.push_str("\nUse these organization names when filing FOIA requests.");
    out
}

pub fn my_requests(status: Option<&str>, requests: &[FoiaRequest]) -> String {
    let mut out = format!("Found {} of your FOIA requests", requests.len());
    if let Some(status) = status {
        let _ = write!(out, " with status '{}'", status);
    }
    out.push_str(":\n\n");

    for r in requests {
        let _ = writeln!(out, "**{}**", r.title);
        let _ = writeln!(out, "- ID: {}", r.id);
        let _ = writeln!(out, "- Status: {}", r.status);
        let _ = writeln!(
            out,
            "- Submitted: {}",
            r.datetime_submitted.as_deref().unwrap_or("N/A")
        );
        let _ = writeln!(out, "- Agency ID: {}\n", or_unknown(r.agency));
    }
    out
}

/// Result of a successful login through one of the authenticate tools
pub fn authenticated(user: &User, orgs: &[Organization], source: Option<&str>) -> String {
    let mut out = String::from("Successfully authenticated!\n\n");
    let _ = writeln!(out, "**Username:** {}", user.username);
    let _ = writeln!(out, "**User ID:** {}", user.id);

    if !orgs.is_empty() {
        out.push_str("\n**Your Organizations:**\n");
        organization_lines(&mut out, orgs);
    }

    if let Some(source) = source {
        let _ = writeln!(out, "\n{}", source);
    }
    out.push_str("\nYou can now file requests, view your requests, send follow-ups and file appeals.");
    out
}

pub fn session_status(status: &SessionStatus) -> String {
    let mut out = if status.authenticated {
        format!(
            "**Authenticated as: {}**\n\n",
            status.username.as_deref().unwrap_or("unknown")
        )
    } else {
        String::from("**Not authenticated**\n\n")
    };

    let _ = writeln!(out, "**Access type:** {}", status.access_type);
    let _ = writeln!(out, "**Session valid:** {}", if status.valid { "yes" } else { "refresh due" });
    let _ = writeln!(out, "**Session started:** {}", status.created_at.to_rfc3339());
    if let Some(expires_at) = status.expires_at {
        let _ = writeln!(out, "**Assumed expiry:** {}", expires_at.to_rfc3339());
    }
    if let Some(secs) = status.time_until_refresh {
        let _ = writeln!(out, "**Next refresh in:** {}", human_duration(secs));
    }
    let _ = writeln!(out, "\n{}", status.note);

    if !status.authenticated {
        out.push_str(
            "\nAnonymous access can search requests, view request details and search agencies.\n\
             Use `authenticate`, or `set_username` followed by `authenticate_with_env_password`, to unlock filing, follow-ups and appeals.",
        );
    }
    out
}

pub fn test_result(result: &TestResult) -> String {
    let headline = match result.status {
        TestStatus::Success => "Authentication test passed",
        TestStatus::Anonymous => "Anonymous access",
        TestStatus::Error => "Authentication test failed",
    };
    format!(
        "**{}**\n\n{}\n\n{}",
        headline,
        result.message,
        session_status(&result.session)
    )
}

/// Render seconds as "1h 5m" / "12m 3s" / "42s"
pub fn human_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

pub fn organization_choice(heading: &str, orgs: &[Organization]) -> String {
    let mut out = format!("{}\n\n**Your available organizations:**\n", heading);
    for org in orgs {
        let _ = writeln!(out, "- {}", org.name);
    }
    out.push_str("\nCall file_foia_request again with `organization_name` set to one of these.");
    out
}

pub struct FiledRequest<'a> {
    pub title: &'a str,
    pub request_id: Option<u64>,
    pub location: Option<&'a str>,
    pub organization: &'a Organization,
    pub selection: &'a str,
    pub agency_count: usize,
    pub embargo: bool,
    pub fee_waiver: bool,
}

pub fn filed_request(filed: &FiledRequest<'_>) -> String {
    let mut out = String::from("Successfully filed FOIA request!\n\n");
    let _ = writeln!(out, "{}\n", filed.selection);
    out.push_str("**Request Details:**\n");
    let _ = writeln!(out, "- **Title:** {}", filed.title);
    let _ = writeln!(out, "- **Request ID:** {}", or_unknown(filed.request_id));
    out.push_str("- **Status:** Submitted\n");
    let _ = writeln!(
        out,
        "- **Organization:** {} (ID: {})",
        filed.organization.name, filed.organization.id
    );
    let _ = writeln!(out, "- **Agencies:** {}", filed.agency_count);
    let _ = writeln!(out, "- **Embargo:** {}", yes_no(filed.embargo));
    let _ = writeln!(out, "- **Fee Waiver Requested:** {}", yes_no(filed.fee_waiver));
    if let Some(location) = filed.location {
        let _ = writeln!(out, "\n**Track your request at:** {}", location);
    }
    out
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muckrock::FileAttachment;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        // Multi-byte characters are counted, not bytes
        assert_eq!(truncate_chars("ééééé", 2), "éé...");
    }

    #[test]
    fn test_request_details_limits() {
        let request = FoiaRequest {
            id: 7,
            title: "Police emails".into(),
            status: "ack".into(),
            requested_docs: Some("x".repeat(800)),
            ..Default::default()
        };
        let comms: Vec<Communication> = (0..5)
            .map(|i| Communication {
                id: i,
                communication: Some("y".repeat(300)),
                ..Default::default()
            })
            .collect();

        let text = request_details(&request, Some(&comms));
        assert!(text.contains(&format!("{}...", "x".repeat(500))));
        assert!(!text.contains(&"x".repeat(501)));
        assert!(text.contains("Communication 3:"));
        assert!(!text.contains("Communication 4:"));
        assert!(!text.contains(&"y".repeat(201)));
    }

    #[test]
    fn test_request_details_without_communications() {
        let request = FoiaRequest::default();
        assert!(request_details(&request, None).contains("Unable to retrieve"));
        assert!(request_details(&request, Some(&[])).contains("None"));
    }

    #[test]
    fn test_files_flattens_communications() {
        let request = FoiaRequest::default();
        let comms = vec![
            Communication {
                files: vec![FileAttachment {
                    title: Some("letter.pdf".into()),
                    ..Default::default()
                }],
                ..Default::default()
            },
            Communication {
                files: vec![FileAttachment {
                    ffile: Some("https://cdn.example/records.pdf".into()),
                    ..Default::default()
                }],
                ..Default::default()
            },
        ];
        let text = files(&request, &comms);
        assert!(text.contains("Total files: 2"));
        assert!(text.contains("letter.pdf"));
        assert!(text.contains("records.pdf"));
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(42), "42s");
        assert_eq!(human_duration(125), "2m 5s");
        assert_eq!(human_duration(3900), "1h 5m");
        assert_eq!(human_duration(-5), "0s");
    }

    #[test]
    fn test_organizations_empty() {
        assert_eq!(organizations(&[]), "No organizations found for your account.");
    }
}
