use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::permissions::ports::{GroupDirectory, Notifier, PermResult};
use crate::permissions::types::{Group, Notification};

pub const TEMPLATE_PENDING: &str = "pending_permission_request";
pub const TEMPLATE_ACTIONED: &str = "permission_request_actioned";
pub const TEMPLATE_CANCELLED: &str = "permission_request_cancelled";

pub fn pending_subject(permission: &str, group: &str) -> String {
    format!("Request for permission {permission} for {group}")
}

pub fn update_subject(permission: &str, group: &str) -> String {
    format!("Re: {}", pending_subject(permission, group))
}

/// Pick which matched owners hear about a new request.
///
/// Owners matched through a specific argument pattern win. Failing that,
/// owners that are not global owners. Failing that, everyone matched.
pub fn select_notified_owners<'a>(
    owner_arg_list: &'a [(Group, String)],
    global_owners: &[Group],
) -> Vec<&'a Group> {
    let non_wildcard: Vec<&Group> = owner_arg_list
        .iter()
        .filter(|(_, argument)| argument != "*")
        .map(|(group, _)| group)
        .collect();
    if !non_wildcard.is_empty() {
        return non_wildcard;
    }

    let non_global: Vec<&Group> = owner_arg_list
        .iter()
        .filter(|(group, _)| !global_owners.iter().any(|g| g.id == group.id))
        .map(|(group, _)| group)
        .collect();
    if !non_global.is_empty() {
        return non_global;
    }

    owner_arg_list.iter().map(|(group, _)| group).collect()
}

/// The group's own address when it has one, else every direct user member.
pub async fn recipient_addresses(
    groups: &dyn GroupDirectory,
    owners: &[&Group],
) -> PermResult<BTreeSet<String>> {
    let mut addresses = BTreeSet::new();
    for owner in owners {
        match &owner.email_address {
            Some(email) => {
                addresses.insert(email.clone());
            }
            None => {
                for member in groups.direct_members(owner.id).await? {
                    addresses.insert(member.username);
                }
            }
        }
    }
    Ok(addresses)
}

/// Logs notifications instead of rendering and mailing them.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    pub from_addr: String,
    pub send_emails: bool,
}

impl From<&crate::settings::Notifications> for LogNotifier {
    fn from(settings: &crate::settings::Notifications) -> Self {
        Self {
            from_addr: settings.from_addr.clone(),
            send_emails: settings.send_emails,
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> PermResult<()> {
        if !self.send_emails {
            tracing::debug!(
                template = %notification.template,
                recipients = notification.recipients.len(),
                "Email sending disabled, dropping notification"
            );
            return Ok(());
        }
        tracing::info!(
            from = %self.from_addr,
            template = %notification.template,
            subject = %notification.subject,
            recipients = ?notification.recipients,
            "Dispatching notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::owners::tests::group;

    fn names(selected: &[&Group]) -> Vec<String> {
        selected.iter().map(|g| g.name.clone()).collect()
    }

    #[test]
    fn test_non_wildcard_owners_preferred() {
        let list = vec![
            (group(1, "admins"), "*".to_string()),
            (group(2, "net"), "*".to_string()),
            (group(3, "east"), "prod".to_string()),
        ];
        let globals = vec![group(1, "admins")];
        assert_eq!(names(&select_notified_owners(&list, &globals)), vec!["east"]);
    }

    #[test]
    fn test_non_global_owners_next() {
        let list = vec![
            (group(1, "admins"), "*".to_string()),
            (group(2, "net"), "*".to_string()),
        ];
        let globals = vec![group(1, "admins")];
        assert_eq!(names(&select_notified_owners(&list, &globals)), vec!["net"]);
    }

    #[test]
    fn test_fall_back_to_everyone() {
        let list = vec![
            (group(1, "admins"), "*".to_string()),
            (group(4, "root"), "*".to_string()),
        ];
        let globals = vec![group(1, "admins"), group(4, "root")];
        assert_eq!(
            names(&select_notified_owners(&list, &globals)),
            vec!["admins", "root"]
        );
    }

    #[test]
    fn test_subjects() {
        assert_eq!(
            pending_subject("ssh", "eng"),
            "Request for permission ssh for eng"
        );
        assert_eq!(
            update_subject("ssh", "eng"),
            "Re: Request for permission ssh for eng"
        );
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notification = Notification {
            recipients: ["a@example.com".to_string()].into_iter().collect(),
            subject: pending_subject("ssh", "eng"),
            template: TEMPLATE_PENDING.to_string(),
            context: serde_json::json!({ "argument": "prod" }),
        };
        let mut notifier = LogNotifier::from(&crate::settings::Notifications::default());
        assert!(notifier.send_emails);
        notifier.send(&notification).await.unwrap();

        notifier.send_emails = false;
        notifier.send(&notification).await.unwrap();
    }
}
