//! User-facing reply text (Brazilian Portuguese)

use contact_agent_core::{Contact, MentionedConnection};
use contact_agent_text_processing::Suggestion;

pub const WELCOME: &str =
    "Olá! 👋 Eu organizo a sua rede de contatos pelo WhatsApp. Para começar, qual é o seu nome?";

pub const ASK_NAME: &str = "Qual é o seu nome completo?";

pub const ASK_EMAIL: &str = "Qual é o seu e-mail? Vou usá-lo para criar o seu acesso.";

pub const INVALID_EMAIL: &str =
    "Não consegui reconhecer um e-mail válido. Pode enviar no formato nome@dominio.com?";

pub const EMAIL_CONFLICT: &str =
    "Esse e-mail já está cadastrado em outra conta. Pode me informar outro e-mail?";

pub const PHONE_DECLINED: &str =
    "Sem problemas. Para o cadastro preciso que você escreva do seu próprio WhatsApp. Este número é seu? (sim/não)";

pub const HELP: &str = "Posso salvar e encontrar contatos para você. Exemplos:\n\
• \"Conheci a Ana Souza, diretora de marketing na Acme, 21 98765-4321\"\n\
• \"Quem eu conheço que trabalha com investimentos?\"\n\
• \"Atualiza o e-mail do Carlos para carlos@acme.com\"";

pub const ASK_CONTACT_DETAILS: &str =
    "Claro! Me conte sobre a pessoa: nome, empresa, cargo, telefone e como vocês se conheceram.";

pub const EXTRACTION_FAILED: &str =
    "Não consegui entender os dados do contato. Pode escrever de novo com o nome e algum detalhe (empresa, cargo ou telefone)?";

pub const APOLOGY: &str =
    "Desculpe, tive um problema para processar sua mensagem agora. Pode tentar de novo em instantes?";

pub fn ask_phone_confirmation(display_phone: &str) -> String {
    format!(
        "Este número {} é o seu WhatsApp pessoal? Responda sim ou não.",
        display_phone
    )
}

pub fn ask_email_for(name: &str) -> String {
    format!("Obrigado, {}! Qual é o seu e-mail?", first_name(name))
}

pub fn registration_completed(name: &str, email: &str, temporary_password: &str) -> String {
    format!(
        "Cadastro concluído, {}! 🎉\nSeu acesso: {}\nSenha temporária: {}\n\nAgora é só me mandar os contatos que você conhece.",
        first_name(name),
        email,
        temporary_password
    )
}

pub fn contact_created(contact: &Contact) -> String {
    format!("Contato salvo: {}", contact.summary())
}

pub fn contact_updated(contact: &Contact) -> String {
    format!("Contato atualizado: {}", contact.summary())
}

pub fn contact_unchanged(contact: &Contact) -> String {
    format!("Já tenho essas informações de {}.", contact.name)
}

pub fn mentions_saved(count: usize) -> String {
    match count {
        0 => String::new(),
        1 => "Também anotei 1 pessoa mencionada.".to_string(),
        n => format!("Também anotei {} pessoas mencionadas.", n),
    }
}

pub fn query_found(contact: &Contact) -> String {
    let mut text = format!("Encontrei: {}", contact.summary());
    if let Some(ref email) = contact.email {
        text.push_str(&format!("\n✉️ {}", email));
    }
    if let Some(ref context) = contact.context {
        text.push_str(&format!("\n📝 {}", context));
    }
    text
}

pub fn query_bridge(connection: &MentionedConnection, via: &Contact) -> String {
    let mut text = format!("{} foi mencionado(a) por {}", connection.name, via.name);
    if let Some(ref description) = connection.description {
        text.push_str(&format!(": {}", description));
    }
    text.push_str(&format!(
        "\nPeça uma apresentação a {}.",
        first_name(&via.name)
    ));
    text
}

pub fn not_found(term: &str, suggestions: &[Suggestion<Contact>]) -> String {
    if suggestions.is_empty() {
        return format!("Não encontrei ninguém para \"{}\" na sua rede.", term);
    }
    let names = suggestions
        .iter()
        .map(|s| s.item.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Não encontrei \"{}\". Você quis dizer: {}?",
        term, names
    )
}

fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}
