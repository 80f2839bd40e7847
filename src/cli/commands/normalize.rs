//! Normalization inspection command.

use crate::matching::normalize;

/// Print the comparison key for each title
pub fn cmd_normalize(titles: &[String]) {
    for title in titles {
        let key = normalize(title);
        if key.is_empty() {
            println!("{:?} → (empty)", title);
        } else {
            println!("{:?} → {:?}", title, key.as_str());
        }
    }
}
