use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use nova_admin::{
    AuthToken,
    Authenticator,
    ConsoleError,
    Session,
};
use rpassword::prompt_password;
use std::io::{
    self,
    BufRead,
    Write,
};

const MAX_ATTEMPTS: usize = 3;

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush().wrap_err("Failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .wrap_err("Failed to read username")?;
    let username = line.trim().to_string();
    if username.is_empty() {
        return Err(eyre!("Username must not be empty"));
    }
    Ok(username)
}

/// Asks for credentials until the API accepts them or the attempts run out.
pub async fn login<A: Authenticator>(
    session: &mut Session,
    authenticator: &A,
    username: Option<&str>,
) -> Result<AuthToken> {
    for attempt in 1..=MAX_ATTEMPTS {
        let username = match username {
            Some(name) => name.to_string(),
            None => prompt_username()?,
        };
        let password = prompt_password(format!("Password for {username}: "))
            .wrap_err("Failed to read password")?;

        match session.login(authenticator, &username, &password).await {
            Ok(token) => {
                println!("Logged in as {username}.");
                return Ok(token);
            }
            Err(err @ ConsoleError::SessionStorage(_)) => {
                return Err(err).wrap_err("Login succeeded but the session could not be stored");
            }
            Err(err) => {
                eprintln!("{err} (attempt {attempt}/{MAX_ATTEMPTS})");
            }
        }
    }
    Err(eyre!("Giving up after {MAX_ATTEMPTS} failed login attempts"))
}
